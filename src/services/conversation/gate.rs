use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use super::TurnPolicy;
use super::turn::TurnError;

/// Held for the duration of one turn.
pub(super) enum TurnPermit {
    Exclusive { _guard: OwnedMutexGuard<()> },
    Unguarded,
}

/// Per-conversation exclusion registry.
pub(super) struct TurnGate {
    policy: TurnPolicy,
    // NOTE: std Mutex; only touched to look up the per-conversation lock.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TurnGate {
    pub(super) fn new(policy: TurnPolicy) -> Self {
        Self {
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn policy(&self) -> TurnPolicy {
        self.policy
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let Ok(mut locks) = self.locks.lock() else {
            return Arc::new(tokio::sync::Mutex::new(()));
        };
        // Drop locks nobody holds or waits on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Wait for (Queue) or try (Reject) the conversation's turn slot.
    pub(super) async fn enter(&self, conversation_id: &str) -> Result<TurnPermit, TurnError> {
        match self.policy {
            TurnPolicy::Concurrent => Ok(TurnPermit::Unguarded),
            TurnPolicy::Queue => Ok(TurnPermit::Exclusive {
                _guard: self.lock_for(conversation_id).lock_owned().await,
            }),
            TurnPolicy::Reject => self
                .lock_for(conversation_id)
                .try_lock_owned()
                .map(|guard| TurnPermit::Exclusive { _guard: guard })
                .map_err(|_| TurnError::Busy),
        }
    }

    #[cfg(test)]
    pub(super) fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
