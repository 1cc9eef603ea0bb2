//! Turn execution loop: call the model, dispatch the tools it asks for,
//! feed the results back, repeat until it answers without tools.

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ra_domain::tool::{Message, ToolCall};
use ra_domain::trace::TraceEvent;
use ra_mcp_client::TransportError;

use crate::backend::{ChatResponse, ModelBackend};
use crate::compress::{estimate_token_count, HistoryCompressor};
use crate::display::DisplaySink;
use crate::gateway::ToolGateway;

use super::TurnError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnContext: collaborators for one turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TurnContext<'a> {
    pub session_id: &'a str,
    pub backend: &'a dyn ModelBackend,
    pub gateway: &'a ToolGateway,
    pub compressor: &'a HistoryCompressor,
    /// Receives every produced message, in production order.
    pub sink: &'a dyn DisplaySink,
    pub max_rounds: u32,
    pub keep_full_turns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    CallingModel,
    AwaitingToolResults,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Content of the final tool-free assistant message.
    pub reply: String,
    /// Model calls made.
    pub rounds: u32,
    /// Messages appended by this turn.
    pub messages: Vec<Message>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn over `history`, which must already end with the user
/// message. The vector is the turn's private working history: every round
/// compresses from it and appends to it.
///
/// Messages already passed to the sink stay emitted when the turn fails.
pub async fn run_turn(
    ctx: &TurnContext<'_>,
    history: Vec<Message>,
    cancel: &CancellationToken,
) -> Result<TurnOutcome, TurnError> {
    let span = tracing::info_span!("turn", session_id = %ctx.session_id);
    let start = history.len();
    let mut run = TurnRun {
        ctx,
        history,
        state: TurnState::CallingModel,
        rounds: 0,
    };

    let result = run.drive(cancel).instrument(span).await;
    if result.is_err() {
        run.transition(TurnState::Failed);
    }

    let emitted = run.history.len() - start;
    TraceEvent::TurnFinished {
        session_id: ctx.session_id.to_owned(),
        rounds: run.rounds,
        messages_emitted: emitted,
        outcome: match &result {
            Ok(_) => "done".into(),
            Err(e) => e.kind().into(),
        },
    }
    .emit();

    let reply = result?;
    Ok(TurnOutcome {
        reply,
        rounds: run.rounds,
        messages: run.history.split_off(start),
    })
}

struct TurnRun<'c, 'a> {
    ctx: &'c TurnContext<'a>,
    history: Vec<Message>,
    state: TurnState,
    rounds: u32,
}

impl TurnRun<'_, '_> {
    async fn drive(&mut self, cancel: &CancellationToken) -> Result<String, TurnError> {
        let ctx = self.ctx;
        let tools = ctx.gateway.list_tools();

        while self.rounds < ctx.max_rounds {
            self.transition(TurnState::CallingModel);
            self.rounds += 1;
            let round = self.rounds;

            let compressed = self.compressed_history();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                r = ctx
                    .backend
                    .chat_with_tools(&compressed, &tools)
                    .instrument(tracing::debug_span!("model_call", round)) => r?,
            };

            let ChatResponse {
                content,
                reasoning,
                tool_calls,
            } = response;

            if let Some(text) = reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
                ctx.sink.on_reasoning(text);
            }

            if tool_calls.is_empty() {
                self.push(Message::assistant(content.clone()).with_reasoning(reasoning));
                self.transition(TurnState::Done);
                return Ok(content);
            }

            tracing::debug!(round, tool_count = tool_calls.len(), "model requested tools");
            self.push(Message::assistant_with_tools(content, tool_calls.clone()).with_reasoning(reasoning));

            self.transition(TurnState::AwaitingToolResults);
            ctx.sink.on_tool_call_start();
            self.dispatch(&tool_calls, cancel).await?;
        }

        tracing::warn!(limit = ctx.max_rounds, "round budget exhausted");
        Err(TurnError::RoundBudgetExceeded {
            limit: ctx.max_rounds,
        })
    }

    /// Run the calls strictly in order, appending each result as soon as it
    /// arrives.
    async fn dispatch(&mut self, calls: &[ToolCall], cancel: &CancellationToken) -> Result<(), TurnError> {
        let ctx = self.ctx;

        for (i, call) in calls.iter().enumerate() {
            let span = tracing::debug_span!("tool_call", tool = %call.name, call_id = %call.id);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = ctx.gateway.call_tool(&call.name, call.arguments.clone()).instrument(span) => Some(r),
            };

            let content = match outcome {
                None => {
                    self.close_pending(&calls[i..], "turn cancelled");
                    return Err(TurnError::Cancelled);
                }
                Some(Err(TransportError::Closed)) => {
                    self.close_pending(&calls[i..], "upstream connection closed");
                    return Err(TurnError::Transport(TransportError::Closed));
                }
                Some(Err(e)) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                    format!("Error: {e}")
                }
                Some(Ok(result)) => {
                    if result.is_error {
                        tracing::debug!(tool = %call.name, "tool returned an error result");
                    }
                    result.text()
                }
            };

            self.push(Message::tool_result(call.id.clone(), content));
        }
        Ok(())
    }

    /// Answer calls that will never run so the history stays well formed.
    fn close_pending(&mut self, calls: &[ToolCall], reason: &str) {
        for call in calls {
            self.push(Message::tool_result(call.id.clone(), format!("Error: {reason}")));
        }
    }

    fn compressed_history(&self) -> Vec<Message> {
        let compressed = self
            .ctx
            .compressor
            .compress(&self.history, self.ctx.keep_full_turns);

        let tokens_before = estimate_token_count(&self.history);
        let tokens_after = estimate_token_count(&compressed);
        if tokens_after < tokens_before {
            TraceEvent::HistoryCompressed {
                messages: compressed.len(),
                tokens_before,
                tokens_after,
            }
            .emit();
        }
        compressed
    }

    fn push(&mut self, message: Message) {
        self.ctx.sink.on_message(&message);
        self.history.push(message);
    }

    fn transition(&mut self, next: TurnState) {
        tracing::trace!(from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
