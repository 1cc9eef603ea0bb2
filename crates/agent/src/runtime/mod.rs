//! Turn execution runtime.
//!
//! [`turn::run_turn`] drives one conversational turn, [`agent::Agent`]
//! wraps it with history bookkeeping and per-session single-flight, and
//! [`autoplay::AutoplayCoordinator`] repeats turns on a timer.

pub mod agent;
pub mod autoplay;
pub mod cancel;
pub mod history;
pub mod session_lock;
pub mod turn;

use ra_mcp_client::TransportError;

use crate::backend::BackendError;

pub use agent::Agent;
pub use autoplay::{AutoplayCoordinator, AutoplayError, AutoplayStatus};
pub use turn::{run_turn, TurnContext, TurnOutcome, TurnState};

/// Reasons a turn aborts. Tool-level failures never show up here; they
/// become `tool` messages the model can react to.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("upstream transport: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("too many tool call rounds (limit: {limit})")]
    RoundBudgetExceeded { limit: u32 },

    #[error("turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// Short label used in trace events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Backend(_) => "backend_error",
            Self::RoundBudgetExceeded { .. } => "round_budget_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}
