//! Server-Sent-Events reassembly for streamed JSON-RPC replies.
//!
//! SSE events are delimited by a blank line. Each event block may contain
//! `event:`, `data:`, `id:` or `retry:` lines; only `data:` lines matter.
//! One logical JSON document may be split across several consecutive
//! `data:` lines, so the payloads of one event are concatenated before
//! the caller parses them.

/// Incremental decoder fed with raw body chunks.
///
/// Bytes are buffered until they form valid UTF-8, so a multi-byte
/// character split across two chunks is never mangled. CRLF line endings
/// are normalized to LF.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every event it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // Incomplete trailing sequence: keep it for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.append(&text);
                return drain_events(&mut self.buffer);
            }
        };
        let text: String = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        self.append(&text);
        drain_events(&mut self.buffer)
    }

    /// Flush a final event that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.append(&text);
        }
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        self.buffer.push_str("\n\n");
        drain_events(&mut self.buffer)
    }

    fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }
}

/// Extract the joined `data:` payload of every complete event in `buffer`.
///
/// The buffer is drained in-place: consumed bytes are removed and any
/// trailing partial event remains for the next call. Events without
/// `data:` lines produce nothing.
pub fn drain_events(buffer: &mut String) -> Vec<String> {
    let mut events = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        let mut payload = String::new();
        let mut has_data = false;
        for line in block.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                payload.push_str(data.trim_end_matches('\r'));
                has_data = true;
            }
        }
        if has_data && !payload.trim().is_empty() {
            events.push(payload);
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcResponse;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: {\"hello\":\"world\"}\n\n");
        let events = drain_events(&mut buf);
        assert_eq!(events, vec!["{\"hello\":\"world\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_joins_multi_line_data() {
        let mut buf = String::from("data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":2,\"result\":{}}\n\n");
        let events = drain_events(&mut buf);
        assert_eq!(events.len(), 1);
        let resp: JsonRpcResponse = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(resp.id, Some(2));
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let events = drain_events(&mut buf);
        assert_eq!(events, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_ignores_non_data_lines() {
        let mut buf = String::from("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n: comment\n\n");
        let events = drain_events(&mut buf);
        assert_eq!(events, vec!["payload"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\r\n\r\n");
        assert_eq!(events, vec!["{\"a\":1}"]);
    }

    #[test]
    fn decoder_reassembles_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"jsonrpc\":\"2.0\",").is_empty());
        assert!(decoder.push(b"\"id\":5,\"result\":{}}\r").is_empty());
        let events = decoder.push(b"\n\r\n");
        let resp: JsonRpcResponse = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(resp.id, Some(5));
    }

    #[test]
    fn decoder_keeps_split_utf8_intact() {
        let text = "data: \"héllo\"\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&text[..split]).is_empty());
        let events = decoder.push(&text[split..]);
        assert_eq!(events, vec!["\"héllo\""]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[test]
    fn parses_large_payload() {
        let large = "a".repeat(70 * 1024);
        let body = format!(
            "data: {{\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{{\"payload\":\"{large}\"}}}}\n\n"
        );
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(8 * 1024) {
            events.extend(decoder.push(chunk));
        }
        assert!(decoder.finish().is_empty());
        assert_eq!(events.len(), 1);
        let resp: JsonRpcResponse = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(resp.id, Some(3));
        assert_eq!(resp.result.unwrap()["payload"].as_str().unwrap().len(), 70 * 1024);
    }
}
