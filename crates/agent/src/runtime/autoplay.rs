//! Autoplay: a supervised, recurring synthetic turn.
//!
//! `start` launches a background task that runs the turn immediately, then
//! again after every interval. The task owns a private cancellation token:
//! `stop` prevents future turns but never aborts the one in flight.
//! After `max_consecutive_errors` failures in a row the task stops itself.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use ra_domain::config::AutoplayConfig;
use ra_domain::trace::TraceEvent;

use super::TurnError;

/// The unit of work autoplay repeats.
#[async_trait::async_trait]
pub trait AutoplayTurn: Send + Sync + 'static {
    async fn run_autoplay_turn(&self, message: &str) -> Result<(), TurnError>;
}

/// Lifecycle notifications. All methods have no-op defaults.
pub trait AutoplayObserver: Send + Sync + 'static {
    fn on_started(&self, _message: &str) {}

    fn on_stopped(&self, _reason: StopReason) {}

    fn on_error(&self, _error: &TurnError, _consecutive: u32) {}
}

pub struct NullObserver;

impl AutoplayObserver for NullObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    CircuitOpen,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AutoplayError {
    #[error("autoplay already running")]
    AlreadyRunning,
    #[error("autoplay not active")]
    NotRunning,
    #[error("autoplay message cannot be empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoplayStatus {
    pub enabled: bool,
    pub message: Option<String>,
    pub interval_secs: u64,
    pub consecutive_errors: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AutoplayCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    session_id: String,
    turn: Arc<dyn AutoplayTurn>,
    observer: Arc<dyn AutoplayObserver>,
    interval: Duration,
    max_consecutive_errors: u32,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    /// Bumped on every start so a superseded task can tell it is stale.
    generation: u64,
    consecutive_errors: u32,
}

struct Running {
    generation: u64,
    message: String,
    cancel: CancellationToken,
}

impl AutoplayCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        config: &AutoplayConfig,
        turn: Arc<dyn AutoplayTurn>,
        observer: Arc<dyn AutoplayObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                turn,
                observer,
                interval: Duration::from_secs(config.interval_secs),
                max_consecutive_errors: config.max_consecutive_errors.max(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Transition Idle -> Running and launch the supervising task.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, message: &str) -> Result<(), AutoplayError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AutoplayError::EmptyMessage);
        }

        let cancel = CancellationToken::new();
        let generation = {
            let mut state = self.shared.state.lock();
            if state.running.is_some() {
                return Err(AutoplayError::AlreadyRunning);
            }
            state.generation += 1;
            state.consecutive_errors = 0;
            state.running = Some(Running {
                generation: state.generation,
                message: message.to_owned(),
                cancel: cancel.clone(),
            });
            state.generation
        };

        tracing::info!(
            session_id = %self.shared.session_id,
            interval_secs = self.shared.interval.as_secs(),
            "autoplay started"
        );
        self.shared.notify_state(true, "started");
        self.shared.observer.on_started(message);

        let shared = self.shared.clone();
        let message = message.to_owned();
        tokio::spawn(async move { shared.supervise(generation, message, cancel).await });
        Ok(())
    }

    /// Transition Running -> Idle. An in-flight turn runs to completion.
    pub fn stop(&self) -> Result<(), AutoplayError> {
        let running = self
            .shared
            .state
            .lock()
            .running
            .take()
            .ok_or(AutoplayError::NotRunning)?;
        running.cancel.cancel();

        tracing::info!(session_id = %self.shared.session_id, "autoplay stopped");
        self.shared.notify_state(false, StopReason::Requested.as_str());
        self.shared.observer.on_stopped(StopReason::Requested);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running.is_some()
    }

    pub fn status(&self) -> AutoplayStatus {
        let state = self.shared.state.lock();
        AutoplayStatus {
            enabled: state.running.is_some(),
            message: state.running.as_ref().map(|r| r.message.clone()),
            interval_secs: self.shared.interval.as_secs(),
            consecutive_errors: state.consecutive_errors,
        }
    }
}

impl Drop for AutoplayCoordinator {
    fn drop(&mut self) {
        if let Some(running) = self.shared.state.lock().running.take() {
            running.cancel.cancel();
        }
    }
}

impl Shared {
    async fn supervise(&self, generation: u64, message: String, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Not raced against `cancel`: a dispatched turn always finishes.
            let result = self.turn.run_autoplay_turn(&message).await;

            match result {
                Ok(()) => self.with_current(generation, |state| state.consecutive_errors = 0),
                Err(e) => {
                    let Some(count) = self.with_current(generation, |state| {
                        state.consecutive_errors += 1;
                        Some(state.consecutive_errors)
                    }) else {
                        break;
                    };

                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %e,
                        consecutive = count,
                        "autoplay turn failed"
                    );
                    self.observer.on_error(&e, count);

                    if count >= self.max_consecutive_errors {
                        self.trip_breaker(generation);
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::debug!(session_id = %self.session_id, generation, "autoplay task exited");
    }

    fn trip_breaker(&self, generation: u64) {
        let stopped = {
            let mut state = self.state.lock();
            match &state.running {
                Some(r) if r.generation == generation => state.running.take(),
                _ => None,
            }
        };
        if stopped.is_some() {
            tracing::warn!(
                session_id = %self.session_id,
                threshold = self.max_consecutive_errors,
                "autoplay circuit open, stopping"
            );
            self.notify_state(false, StopReason::CircuitOpen.as_str());
            self.observer.on_stopped(StopReason::CircuitOpen);
        }
    }

    /// Apply `f` to the state if `generation` is still the active run.
    fn with_current<T: Default>(&self, generation: u64, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock();
        match &state.running {
            Some(r) if r.generation == generation => f(&mut state),
            _ => T::default(),
        }
    }

    fn notify_state(&self, running: bool, reason: &str) {
        TraceEvent::AutoplayStateChanged {
            session_id: self.session_id.clone(),
            running,
            reason: reason.to_owned(),
        }
        .emit();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
