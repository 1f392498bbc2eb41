use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::plugins::store::StoreError;
use crate::services::ai::{ChatMessage, Role};
use crate::services::conversation::{history, ConversationStore};
use crate::services::prompts::{GREETING, SUGGESTIONS};

use super::typewriter::Typewriter;
use super::view::{BubbleId, RenderCommand, ViewModel};

/// A started reveal. Dropping it does not stop the animation.
pub struct Reveal {
    pub id: BubbleId,
    task: Option<JoinHandle<bool>>,
}

impl Reveal {
    /// Wait for the animation; `false` if it was cancelled.
    pub async fn finished(self) -> bool {
        match self.task {
            Some(task) => task.await.unwrap_or(false),
            None => true,
        }
    }
}

/// Keeps store-driven redraws away while a turn is drawing locally.
/// Released on drop.
pub struct RenderHold {
    active: Arc<watch::Sender<usize>>,
}

impl RenderHold {
    fn new(active: Arc<watch::Sender<usize>>) -> Self {
        active.send_modify(|n| *n += 1);
        Self { active }
    }
}

impl Drop for RenderHold {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Turns conversation events into `RenderCommand`s for one view.
pub struct Presenter {
    view: Arc<dyn ViewModel>,
    next_id: AtomicU64,
    tick: Duration,
    cancel: watch::Sender<u64>,
    suggestions_visible: AtomicBool,
    active: Arc<watch::Sender<usize>>,
    // Messages on screen; `None` until the first full draw.
    displayed: Mutex<Option<Vec<ChatMessage>>>,
}

impl Presenter {
    pub fn new(view: Arc<dyn ViewModel>, tick: Duration) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            view,
            next_id: AtomicU64::new(1),
            tick,
            cancel,
            suggestions_visible: AtomicBool::new(false),
            active: Arc::new(watch::channel(0).0),
            displayed: Mutex::new(None),
        }
    }

    fn remember(&self, message: ChatMessage) {
        if let Ok(mut displayed) = self.displayed.lock() {
            displayed.get_or_insert_with(Vec::new).push(message);
        }
    }

    /// Mark a local render in progress until the hold is dropped.
    pub fn hold(&self) -> RenderHold {
        RenderHold::new(self.active.clone())
    }

    /// Resolves once no turn or reveal is drawing.
    pub async fn settled(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn allocate(&self) -> BubbleId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn append(&self, role: Role, text: &str, typing: bool) -> BubbleId {
        let id = self.allocate();
        self.view.apply(RenderCommand::AppendBubble {
            id,
            role,
            text: text.to_string(),
            typing,
        });
        id
    }

    fn cancel_reveals(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }

    pub fn show_user(&self, text: &str) -> BubbleId {
        self.remember(ChatMessage::user(text));
        self.append(Role::User, text, false)
    }

    /// Start the progressive reveal of an assistant reply.
    pub fn reveal_assistant(&self, text: &str) -> Reveal {
        self.remember(ChatMessage::assistant(text));
        let id = self.append(Role::Assistant, "", true);
        let writer = Typewriter::new(self.tick, self.cancel.subscribe());

        if writer.is_instant() {
            self.view.apply(RenderCommand::SetText {
                id,
                text: text.to_string(),
            });
            self.view.apply(RenderCommand::FinishTyping { id });
            return Reveal { id, task: None };
        }

        let view = self.view.clone();
        let text = text.to_string();
        let hold = self.hold();
        let task = tokio::spawn(async move {
            let _hold = hold;
            let done = writer
                .run(&text, |frame| {
                    view.apply(RenderCommand::SetText {
                        id,
                        text: frame.to_string(),
                    })
                })
                .await;
            if done {
                view.apply(RenderCommand::FinishTyping { id });
            }
            done
        });
        Reveal {
            id,
            task: Some(task),
        }
    }

    /// Clear the view and rebuild it from `history`. Empty history shows the greeting.
    pub fn redraw(&self, history: &[ChatMessage]) {
        self.cancel_reveals();
        self.rebuild(history);
    }

    fn rebuild(&self, history: &[ChatMessage]) {
        if let Ok(mut displayed) = self.displayed.lock() {
            *displayed = Some(history.to_vec());
        }
        self.view.apply(RenderCommand::Clear);
        if history.is_empty() {
            self.append(Role::Assistant, GREETING, false);
            return;
        }
        for message in history {
            self.append(message.role, &message.content, false);
        }
    }

    /// Redraw from a store snapshot unless a turn is drawing. Returns false
    /// when deferred. A history identical to what is on screen is a no-op.
    pub fn sync(&self, history: &[ChatMessage]) -> bool {
        let mut applied = false;
        // Checked under the watch lock so no hold can start mid-redraw.
        self.active.send_if_modified(|active| {
            if *active > 0 {
                return false;
            }
            applied = true;
            let unchanged = self
                .displayed
                .lock()
                .map(|d| d.as_deref() == Some(history))
                .unwrap_or(false);
            if !unchanged {
                self.rebuild(history);
            }
            false
        });
        applied
    }

    /// Stop running reveals and return to the empty-conversation view.
    pub fn clear(&self) {
        self.redraw(&[]);
    }

    /// Returns whether suggestions are now visible.
    pub fn toggle_suggestions(&self) -> bool {
        let visible = !self.suggestions_visible.fetch_xor(true, Ordering::Relaxed);
        if visible {
            self.view.apply(RenderCommand::ShowSuggestions(
                SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            ));
        } else {
            self.view.apply(RenderCommand::HideSuggestions);
        }
        visible
    }

    pub fn hide_suggestions(&self) {
        if self.suggestions_visible.swap(false, Ordering::Relaxed) {
            self.view.apply(RenderCommand::HideSuggestions);
        }
    }
}

/// Live view of one conversation: every snapshot redraws the whole thread.
/// Snapshots that arrive while a turn is drawing are held back, coalesced,
/// and applied once it settles.
pub async fn follow_conversation(
    store: &ConversationStore,
    conversation_id: &str,
    presenter: Arc<Presenter>,
) -> Result<JoinHandle<()>, StoreError> {
    let mut subscription = store.subscribe(conversation_id).await?;
    Ok(tokio::spawn(async move {
        'feed: while let Some(mut snapshot) = subscription.changed().await {
            loop {
                if let Some(newer) = subscription.latest() {
                    snapshot = newer;
                }
                if presenter.sync(&history(&snapshot)) {
                    break;
                }
                tokio::select! {
                    _ = presenter.settled() => {}
                    newer = subscription.changed() => match newer {
                        Some(newer) => snapshot = newer,
                        None => break 'feed,
                    },
                }
            }
        }
        log::debug!("Stopped following {}", subscription.path());
    }))
}
