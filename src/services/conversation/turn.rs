use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use crate::plugins::store::StoreError;
use crate::services::ai::{ChatMessage, CompletionClient, SamplingConfig};
use crate::services::presentation::Presenter;
use crate::services::prompts;

use super::assembler::{assemble, history};
use super::gate::TurnGate;
use super::store::ConversationStore;
use super::{new_conversation_id, ClearMode, TurnPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnState {
    Idle,
    AwaitingUserSubmit,
    Persisting,
    Assembling,
    AwaitingCompletion,
    Rendering,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("Sign in to chat")]
    StoreUnavailable,
    #[error("Message is empty")]
    EmptyInput,
    #[error("A reply is still on its way")]
    Busy,
    #[error("No suggestion #{0}")]
    UnknownSuggestion(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was stored. `rendered` is false when a clear happened mid-turn.
    Completed { reply: ChatMessage, rendered: bool },
    /// A store or completion failure ended the turn early.
    Abandoned { reason: String },
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub conversation_id: String,
    pub trace: Vec<TurnState>,
    pub outcome: TurnOutcome,
}

#[derive(Default)]
struct Current {
    conversation_id: Option<String>,
    // Uid the conversation id was generated under.
    owner: Option<String>,
    epoch: u64,
}

/// Drives one conversation: persist, assemble, complete, persist reply, render.
pub struct TurnController {
    store: ConversationStore,
    completion: Arc<dyn CompletionClient>,
    presenter: Arc<Presenter>,
    gate: TurnGate,
    system_prompt: String,
    // NOTE: std Mutex; never held across `.await`.
    current: Mutex<Current>,
    sampling: Mutex<SamplingConfig>,
    conversation_tx: watch::Sender<Option<String>>,
}

struct Trace(Vec<TurnState>);

impl Trace {
    fn enter(&mut self, state: TurnState) {
        log::debug!("turn -> {:?}", state);
        self.0.push(state);
    }
}

impl TurnController {
    pub fn new(
        store: ConversationStore,
        completion: Arc<dyn CompletionClient>,
        presenter: Arc<Presenter>,
        policy: TurnPolicy,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            completion,
            presenter,
            gate: TurnGate::new(policy),
            system_prompt: prompts::SYSTEM_PROMPT_DEFAULT.to_string(),
            current: Mutex::new(Current::default()),
            sampling: Mutex::new(SamplingConfig::new(model)),
            conversation_tx: watch::channel(None).0,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn presenter(&self) -> &Arc<Presenter> {
        &self.presenter
    }

    pub fn policy(&self) -> TurnPolicy {
        self.gate.policy()
    }

    pub fn model(&self) -> String {
        self.sampling
            .lock()
            .map(|s| s.model.clone())
            .unwrap_or_default()
    }

    /// Applies to turns that have not reached the completion call yet.
    pub fn set_model(&self, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            return;
        }
        if let Ok(mut sampling) = self.sampling.lock() {
            log::info!("Model changed: {} -> {}", sampling.model, model);
            sampling.model = model.to_string();
        }
    }

    pub fn epoch(&self) -> u64 {
        self.current.lock().map(|c| c.epoch).unwrap_or_default()
    }

    /// Current conversation id, if one has been started for this session.
    pub fn conversation_id(&self) -> Option<String> {
        let owner = self.store.owner();
        self.current
            .lock()
            .ok()
            .filter(|c| c.owner == owner)
            .and_then(|c| c.conversation_id.clone())
    }

    /// Receives the conversation id whenever a turn starts a new one, a
    /// clear drops it, or a resume switches to another.
    pub fn conversation_changes(&self) -> watch::Receiver<Option<String>> {
        self.conversation_tx.subscribe()
    }

    /// Id for the next turn plus the epoch it belongs to. A new id is made
    /// on first use and whenever the signed-in user changed.
    fn claim_conversation(&self) -> (String, u64) {
        let owner = self.store.owner();
        let Ok(mut current) = self.current.lock() else {
            return (new_conversation_id(), 0);
        };
        if current.owner != owner || current.conversation_id.is_none() {
            let id = new_conversation_id();
            log::info!("Started conversation {}", id);
            current.conversation_id = Some(id.clone());
            current.owner = owner;
            self.conversation_tx.send_replace(Some(id));
        }
        let id = current.conversation_id.clone().unwrap_or_else(new_conversation_id);
        (id, current.epoch)
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        self.current.lock().map(|c| c.epoch == epoch).unwrap_or(false)
    }

    /// Run one turn for `input`.
    ///
    /// Store and completion failures do not surface as `Err`; they end the
    /// turn with `TurnOutcome::Abandoned` and are logged.
    pub async fn submit(&self, input: &str) -> Result<TurnReport, TurnError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let mut trace = Trace(vec![TurnState::Idle]);
        trace.enter(TurnState::AwaitingUserSubmit);

        trace.enter(TurnState::Persisting);
        if !self.store.is_available() {
            trace.enter(TurnState::Idle);
            return Err(TurnError::StoreUnavailable);
        }

        let (conversation_id, epoch) = self.claim_conversation();

        // Reject refuses before anything is shown; Queue shows the message while it waits.
        let early = match self.gate.policy() {
            TurnPolicy::Reject => Some(self.gate.enter(&conversation_id).await?),
            _ => None,
        };
        let _rendering = self.presenter.hold();
        self.presenter.hide_suggestions();
        self.presenter.show_user(text);
        let _permit = match early {
            Some(permit) => permit,
            None => self.gate.enter(&conversation_id).await?,
        };

        let outcome = self
            .run_turn(&conversation_id, epoch, text, &mut trace)
            .await;
        trace.enter(TurnState::Idle);

        if let TurnOutcome::Abandoned { reason } = &outcome {
            log::warn!("Turn abandoned in {}: {}", conversation_id, reason);
        }
        Ok(TurnReport {
            conversation_id,
            trace: trace.0,
            outcome,
        })
    }

    async fn run_turn(
        &self,
        conversation_id: &str,
        epoch: u64,
        text: &str,
        trace: &mut Trace,
    ) -> TurnOutcome {
        let abandon = |stage: &str, err: &dyn std::fmt::Display| TurnOutcome::Abandoned {
            reason: format!("{stage}: {err}"),
        };

        if let Err(err) = self.store.append(conversation_id, &ChatMessage::user(text)).await {
            return abandon("append user message", &err);
        }

        trace.enter(TurnState::Assembling);
        let messages = match self.store.read_all(conversation_id).await {
            Ok(snapshot) => assemble(&snapshot, &self.system_prompt),
            Err(err) => return abandon("read history", &err),
        };

        trace.enter(TurnState::AwaitingCompletion);
        let sampling = match self.sampling.lock() {
            Ok(sampling) => sampling.clone(),
            Err(_) => return abandon("sampling", &"config lock poisoned"),
        };
        let reply = match self.completion.complete(&messages, &sampling).await {
            Ok(reply) => reply,
            Err(err) => return abandon("completion", &err),
        };

        if let Err(err) = self.store.append(conversation_id, &reply).await {
            return abandon("append reply", &err);
        }

        if !self.is_current_epoch(epoch) {
            log::debug!("Reply for {} arrived after a clear; not rendering", conversation_id);
            return TurnOutcome::Completed {
                reply,
                rendered: false,
            };
        }

        trace.enter(TurnState::Rendering);
        self.presenter.reveal_assistant(&reply.content);
        TurnOutcome::Completed {
            reply,
            rendered: true,
        }
    }

    /// Submit the canned prompt at `index`.
    pub async fn suggest(&self, index: usize) -> Result<TurnReport, TurnError> {
        let prompt = prompts::suggestion(index).ok_or(TurnError::UnknownSuggestion(index))?;
        self.submit(prompt).await
    }

    /// Start over with a new conversation. In-flight turns still store their
    /// reply under the old id but no longer render it.
    pub async fn clear(&self, mode: ClearMode) {
        let previous = match self.current.lock() {
            Ok(mut current) => {
                current.epoch += 1;
                current.conversation_id.take()
            }
            Err(_) => None,
        };
        self.conversation_tx.send_replace(None);
        self.presenter.clear();

        let Some(previous) = previous else {
            return;
        };
        log::info!("Cleared conversation {}", previous);
        if mode == ClearMode::Delete {
            if let Err(err) = self.store.delete(&previous).await {
                log::warn!("Failed to delete conversation {}: {}", previous, err.message());
            }
        }
    }

    /// Switch to an existing conversation and redraw it.
    pub async fn resume(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let snapshot = self.store.read_all(conversation_id).await?;
        let messages = history(&snapshot);
        if let Ok(mut current) = self.current.lock() {
            current.epoch += 1;
            current.conversation_id = Some(conversation_id.to_string());
            current.owner = self.store.owner();
        }
        self.conversation_tx
            .send_replace(Some(conversation_id.to_string()));
        self.presenter.redraw(&messages);
        Ok(messages.len())
    }
}
