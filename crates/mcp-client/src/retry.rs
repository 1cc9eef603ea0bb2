//! Fixed-sequence retry policy with server-provided backoff overrides.

use std::future::Future;
use std::time::Duration;

use ra_domain::config::UpstreamConfig;
use ra_domain::trace::TraceEvent;

use crate::transport::TransportError;

/// Controls how upstream requests are retried.
///
/// Retry `n` (0-indexed) waits `delays[n]`; once the sequence runs out the
/// last delay is reused. A `Retry-After` hint replaces the delay for that
/// one retry, capped at `max_retry_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self {
            delays: cfg.retry_delays_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            max_attempts: cfg.max_attempts.max(1),
            max_retry_after: Duration::from_secs(cfg.max_retry_after_secs),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            delays: Vec::new(),
            max_attempts: 1,
            max_retry_after: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.delays
            .get(retry as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Delay before retry `retry`, preferring a server hint.
    pub fn next_delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(d) => d.min(self.max_retry_after),
            None => self.delay_for_retry(retry),
        }
    }

    /// Whether `attempts_made` has used up the budget.
    pub fn should_give_up(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

/// What one attempt produced.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Try again. `last` is what the caller gets if no attempts remain.
    Retry {
        reason: String,
        rate_limited: bool,
        retry_after: Option<Duration>,
        last: Result<T, TransportError>,
    },
    Fatal(TransportError),
}

/// Run `attempt` until it succeeds, fails fatally, or the policy gives up.
///
/// When the budget is exhausted a retryable transport error is wrapped in
/// [`TransportError::RetriesExhausted`]; a retryable *value* (a structured
/// rate-limit reply) is returned as-is so the caller can surface it.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    method: &str,
    mut attempt: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut made = 0u32;
    loop {
        let outcome = attempt(made).await;
        made += 1;
        match outcome {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(e),
            Attempt::Retry { reason, rate_limited, retry_after, last } => {
                if policy.should_give_up(made) {
                    tracing::warn!(method, attempts = made, %reason, "upstream retries exhausted");
                    return last.map_err(|e| TransportError::RetriesExhausted {
                        attempts: made,
                        last: Box::new(e),
                    });
                }
                let delay = policy.next_delay(made - 1, retry_after);
                TraceEvent::UpstreamRetry {
                    method: method.to_owned(),
                    attempt: made,
                    delay_ms: delay.as_millis() as u64,
                    rate_limited,
                    reason,
                }
                .emit();
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Parse a `Retry-After` value given in seconds.
///
/// HTTP-date values are not supported and yield `None`, which makes the
/// caller fall back to the fixed sequence.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse().ok().and_then(retry_after_secs)
}

/// Seconds to a [`Duration`]. Negative, NaN and out-of-range values yield `None`.
pub(crate) fn retry_after_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn transient<T>(msg: &str) -> Attempt<T> {
        Attempt::Retry {
            reason: msg.into(),
            rate_limited: false,
            retry_after: None,
            last: Err(TransportError::Http(msg.into())),
        }
    }

    #[test]
    fn default_policy_values() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.delays,
            vec![Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(p.max_attempts, 4);
    }

    #[test]
    fn delay_reuses_last_entry() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for_retry(0), Duration::from_secs(2));
        assert_eq!(p.delay_for_retry(2), Duration::from_secs(10));
        assert_eq!(p.delay_for_retry(7), Duration::from_secs(10));
        assert_eq!(RetryPolicy::none().delay_for_retry(0), Duration::ZERO);
    }

    #[test]
    fn parse_retry_after_values() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn parse_retry_after_rejects_unrepresentable_values() {
        assert_eq!(parse_retry_after("1e30"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("1e9"), Some(Duration::from_secs(1_000_000_000)));
    }

    #[test]
    fn server_hint_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retry_after, Duration::from_secs(60));
        let huge = parse_retry_after("1e9");
        assert_eq!(p.next_delay(0, huge), Duration::from_secs(60));
        assert_eq!(p.next_delay(0, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(p.next_delay(1, None), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_after_sleeps_at_most_the_cap() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let value = run_with_retry(&policy, "tools/call", |n| async move {
            if n == 0 {
                Attempt::Retry {
                    reason: "HTTP 429".into(),
                    rate_limited: true,
                    retry_after: parse_retry_after("1e9"),
                    last: Err(TransportError::RateLimited { retry_after: None }),
                }
            } else {
                Attempt::Done(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 1);
        assert_eq!(start.elapsed().as_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_follow_fixed_sequence() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = seen.clone();
        let value = run_with_retry(&policy, "tools/call", move |n| {
            seen2.lock().unwrap().push(start.elapsed());
            async move {
                if n < 3 {
                    transient("connection refused")
                } else {
                    Attempt::Done(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        let secs: Vec<u64> = seen.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![0, 2, 7, 17]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_fixed_delay() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let value = run_with_retry(&policy, "tools/call", |n| async move {
            if n == 0 {
                Attempt::Retry {
                    reason: "HTTP 429".into(),
                    rate_limited: true,
                    retry_after: Some(Duration::from_secs(7)),
                    last: Err(TransportError::RateLimited { retry_after: Some(Duration::from_secs(7)) }),
                }
            } else {
                Attempt::Done("ok")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(start.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let err = run_with_retry::<(), _, _>(&policy, "initialize", |_| {
            calls += 1;
            async { transient("boom") }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 4);
        match err {
            TransportError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, TransportError::Http(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_retryable_value() {
        let policy = RetryPolicy { delays: vec![Duration::from_secs(1)], max_attempts: 2, ..RetryPolicy::none() };
        let value = run_with_retry(&policy, "tools/call", |_| async {
            Attempt::Retry {
                reason: "rate limited".into(),
                rate_limited: true,
                retry_after: None,
                last: Ok("last envelope"),
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "last envelope");
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let err = run_with_retry::<(), _, _>(&policy, "tools/list", |_| {
            calls += 1;
            async { Attempt::Fatal(TransportError::Closed) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, TransportError::Closed));
    }
}
