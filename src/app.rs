use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::{JoinHandle, JoinSet};

use crate::plugins::auth::{AuthError, Authenticator, FirebaseAuth, SessionHandle};
use crate::plugins::store::{LocalTree, MemoryTree, RealtimeTree, StoreError, TreeStore};
use crate::services::ai::OpenAiCompletionClient;
use crate::services::config::{AppConfig, StoreBackend};
use crate::services::conversation::{follow_current, ConversationStore, TurnController};
use crate::services::paths;
use crate::services::presentation::{Presenter, ViewModel};
use crate::services::retry::RetryConfig;

/// Everything one chat session needs, wired from configuration.
pub struct App {
    pub config: AppConfig,
    pub controller: Arc<TurnController>,
    auth: Option<Authenticator>,
    // NOTE: std Mutex; only held to spawn into or take the set.
    turns: Mutex<JoinSet<()>>,
    follower: JoinHandle<()>,
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

async fn open_local(path: Option<&std::path::Path>) -> Result<Arc<dyn TreeStore>, StoreError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => paths::default_db_path().map_err(StoreError::internal)?,
    };
    Ok(Arc::new(LocalTree::open(path).await?))
}

pub async fn open_tree(
    backend: &StoreBackend,
    session: &SessionHandle,
    http: reqwest::Client,
) -> Result<Arc<dyn TreeStore>, StoreError> {
    match backend {
        StoreBackend::Realtime { database_url } => {
            log::info!("Conversation store: using realtime database {}", database_url);
            let tree = RealtimeTree::new(database_url, http)?.with_session(session.clone());
            Ok(Arc::new(tree))
        }
        StoreBackend::RemoteLibsql { url, token } => {
            match LocalTree::open_remote(url.clone(), token.clone()).await {
                Ok(tree) => Ok(Arc::new(tree)),
                Err(err) => {
                    log::warn!(
                        "Conversation store: remote libSQL failed ({}), falling back to local file",
                        err.message()
                    );
                    open_local(None).await
                }
            }
        }
        StoreBackend::LocalFile { path } => open_local(path.as_deref()).await,
        StoreBackend::Memory => {
            log::info!("Conversation store: in memory, nothing is kept after exit");
            Ok(Arc::new(MemoryTree::new()))
        }
    }
}

impl App {
    pub async fn build(config: AppConfig, view: Arc<dyn ViewModel>) -> Result<Self, String> {
        let http = http_client();
        let session = SessionHandle::new();

        let tree = open_tree(&config.store, &session, http.clone())
            .await
            .map_err(|e| format!("Failed to open conversation store: {}", e.message()))?;

        let auth = match config.auth_api_key.as_deref() {
            Some(key) => Some(Authenticator::new(
                Arc::new(FirebaseAuth::new(key, http.clone()).map_err(|e| e.to_string())?),
                session.clone(),
            )),
            None => None,
        };

        let completion = OpenAiCompletionClient::new(&config.ai, http)
            .map_err(|e| format!("{e}; set AI_API_KEY"))?
            .with_retry(RetryConfig::from_env());

        let store = ConversationStore::new(tree, session, config.scope);
        let presenter = Arc::new(Presenter::new(view, config.typewriter_tick));
        let controller = Arc::new(TurnController::new(
            store,
            Arc::new(completion),
            presenter,
            config.turn_policy,
            config.ai.model.clone(),
        ));

        Ok(Self::from_parts(config, controller, auth))
    }

    /// Starts following the controller's current conversation.
    pub(crate) fn from_parts(
        config: AppConfig,
        controller: Arc<TurnController>,
        auth: Option<Authenticator>,
    ) -> Self {
        let follower = follow_current(controller.clone(), auth.as_ref().map(|a| a.on_change()));
        Self {
            config,
            controller,
            auth,
            turns: Mutex::new(JoinSet::new()),
            follower,
        }
    }

    /// Run a turn in the background; `finish` waits for it.
    pub fn spawn_turn<F>(&self, turn: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.turns.lock() {
            Ok(mut turns) => {
                turns.spawn(turn);
            }
            Err(_) => {
                log::warn!("Turn registry poisoned; running turn untracked");
                tokio::spawn(turn);
            }
        }
    }

    /// Wait for every spawned turn and the reveals they started, then stop
    /// following the conversation.
    pub async fn finish(&self) {
        loop {
            let mut pending = match self.turns.lock() {
                Ok(mut turns) => std::mem::take(&mut *turns),
                Err(_) => break,
            };
            if pending.is_empty() {
                break;
            }
            log::debug!("Waiting for {} turn(s) to finish", pending.len());
            while let Some(joined) = pending.join_next().await {
                if let Err(err) = joined {
                    log::warn!("Turn task failed: {}", err);
                }
            }
        }
        self.controller.presenter().settled().await;
        self.follower.abort();
    }

    pub fn auth(&self) -> Result<&Authenticator, AuthError> {
        self.auth.as_ref().ok_or(AuthError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::chat_commands::{execute, ChatCommand, Flow};
    use crate::services::ai::{ChatMessage, CompletionClient, CompletionError, SamplingConfig};
    use crate::services::config::AiConfig;
    use crate::services::conversation::{history, Scope, TurnPolicy};
    use crate::services::presentation::{RecordingView, DEFAULT_TICK};
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowEcho;

    #[async_trait]
    impl CompletionClient for SlowEcho {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _sampling: &SamplingConfig,
        ) -> Result<ChatMessage, CompletionError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatMessage::assistant(format!("re: {last}")))
        }
    }

    fn config(store: StoreBackend) -> AppConfig {
        AppConfig {
            ai: AiConfig {
                api_key: "sk-test".into(),
                ..AiConfig::default()
            },
            store,
            auth_api_key: None,
            scope: Scope::Shared,
            turn_policy: TurnPolicy::Queue,
            typewriter_tick: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_build_in_memory() {
        let app = App::build(config(StoreBackend::Memory), Arc::new(RecordingView::default()))
            .await
            .unwrap();
        assert_eq!(app.controller.store().backend(), "memory");
        assert_eq!(app.auth().err(), Some(AuthError::NotConfigured));
    }

    #[tokio::test]
    async fn test_build_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let app = App::build(
            config(StoreBackend::LocalFile {
                path: Some(path.clone()),
            }),
            Arc::new(RecordingView::default()),
        )
        .await
        .unwrap();
        assert_eq!(app.controller.store().backend(), "libsql");
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_waits_for_pending_turns() {
        let view = Arc::new(RecordingView::default());
        let store = ConversationStore::new(
            Arc::new(MemoryTree::new()),
            SessionHandle::new(),
            Scope::Shared,
        );
        let controller = Arc::new(TurnController::new(
            store,
            Arc::new(SlowEcho),
            Arc::new(Presenter::new(view.clone(), DEFAULT_TICK)),
            TurnPolicy::Queue,
            "test-model",
        ));
        let app = Arc::new(App::from_parts(config(StoreBackend::Memory), controller, None));

        assert_eq!(execute(&app, ChatCommand::Say("hello".into())).await, Flow::Continue);
        assert_eq!(execute(&app, ChatCommand::Say("again".into())).await, Flow::Continue);
        assert_eq!(execute(&app, ChatCommand::Quit).await, Flow::Quit);
        app.finish().await;

        let id = app.controller.conversation_id().unwrap();
        let stored = history(&app.controller.store().read_all(&id).await.unwrap());
        assert_eq!(
            stored,
            vec![
                ChatMessage::user("hello"),
                ChatMessage::assistant("re: hello"),
                ChatMessage::user("again"),
                ChatMessage::assistant("re: again"),
            ]
        );
        let state = view.snapshot();
        assert_eq!(state.bubbles.len(), 4);
        assert!(state.bubbles.iter().all(|b| !b.typing));
        assert_eq!(state.bubbles[3].text, "re: again");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails() {
        let mut config = config(StoreBackend::Memory);
        config.ai.api_key.clear();
        let err = App::build(config, Arc::new(RecordingView::default()))
            .await
            .err()
            .unwrap();
        assert!(err.contains("AI_API_KEY"));
    }
}
