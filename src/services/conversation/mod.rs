//! Conversation turn-taking: scoped persistence, history assembly and the
//! per-conversation turn state machine.

mod assembler;
mod follow;
mod gate;
mod store;
mod turn;

use serde::{Deserialize, Serialize};

pub use assembler::{assemble, history};
pub use follow::follow_current;
pub use store::ConversationStore;
pub use turn::{TurnController, TurnError, TurnOutcome, TurnReport, TurnState};

/// Where a conversation lives in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    /// `users/{uid}/conversations/{id}`; requires a signed-in session.
    #[default]
    PerUser,
    /// `conversation/{id}`; no session needed.
    Shared,
}

/// What happens when a submit arrives while a turn is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPolicy {
    /// Wait for the running turn, in arrival order.
    #[default]
    Queue,
    /// Fail the new submit with `TurnError::Busy`.
    Reject,
    /// No exclusion; turns interleave.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Start a new conversation; the old thread stays in the store.
    Forget,
    /// Start a new conversation and delete the old thread.
    Delete,
}

pub(crate) fn new_conversation_id() -> String {
    format!("conv_{}", uuid::Uuid::new_v4())
}
