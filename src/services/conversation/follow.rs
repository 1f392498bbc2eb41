use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::presentation::follow_conversation;

use super::turn::TurnController;

async fn uid_changed(uid: &mut Option<watch::Receiver<Option<String>>>) -> bool {
    match uid {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Keep the view subscribed to whichever conversation the controller is on.
/// Re-subscribes when the conversation id changes or, given `uid_changes`,
/// when the signed-in user does.
pub fn follow_current(
    controller: Arc<TurnController>,
    mut uid_changes: Option<watch::Receiver<Option<String>>>,
) -> JoinHandle<()> {
    let mut conversations = controller.conversation_changes();
    tokio::spawn(async move {
        loop {
            let feed = match controller.conversation_id() {
                Some(id) => {
                    match follow_conversation(controller.store(), &id, controller.presenter().clone())
                        .await
                    {
                        Ok(task) => Some(task),
                        Err(err) => {
                            log::warn!("Cannot follow conversation {}: {}", id, err.message());
                            None
                        }
                    }
                }
                None => None,
            };

            let (keep_going, uid_closed) = tokio::select! {
                changed = conversations.changed() => (changed.is_ok(), false),
                changed = uid_changed(&mut uid_changes) => (true, !changed),
            };
            if uid_closed {
                uid_changes = None;
            }
            if let Some(feed) = feed {
                feed.abort();
            }
            if !keep_going {
                break;
            }
        }
    })
}
