//! Shared configuration loading for the completion, store and auth services.
//!
//! Secrets never leave this module in printable form; `AiPublicConfig` is safe to show.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::conversation::{Scope, TurnPolicy};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TYPEWRITER_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAI,
    DeepSeek,
    Compatible,
}

impl AiProvider {
    /// Guess the provider from its host; anything unknown is "compatible".
    pub fn infer(base_url: &str) -> Self {
        let base = base_url.trim().to_ascii_lowercase();
        if base.contains("api.deepseek.com") {
            Self::DeepSeek
        } else if base.contains("api.openai.com") {
            Self::OpenAI
        } else {
            Self::Compatible
        }
    }

    /// OpenAI wants the `/v1` prefix in the base, DeepSeek must not have it,
    /// compatible servers are taken as given.
    pub fn normalize_base(self, base_url: &str) -> String {
        let base = base_url.trim().trim_end_matches('/');
        match self {
            Self::OpenAI if !base.ends_with("/v1") => format!("{base}/v1"),
            Self::DeepSeek => base.strip_suffix("/v1").unwrap_or(base).to_string(),
            _ => base.to_string(),
        }
    }
}

impl FromStr for AiProvider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "deepseek" => Ok(Self::DeepSeek),
            "compatible" | "openai-compatible" | "openai_compatible" => Ok(Self::Compatible),
            other => Err(format!("Unknown AI provider: {other}")),
        }
    }
}

/// AI configuration for OpenAI-compatible endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::OpenAI,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Where conversations are kept, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Hosted realtime database (`FIREBASE_DATABASE_URL`).
    Realtime { database_url: String },
    /// Remote libSQL (`TURSO_DATABASE_URL` / `LIBSQL_DATABASE_URL` + token).
    RemoteLibsql { url: String, token: String },
    /// Local libSQL file (`KNOWITALL_DB_PATH`, default `savedata/history.db`).
    LocalFile { path: Option<PathBuf> },
    /// Nothing persisted past the process.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ai: AiConfig,
    pub store: StoreBackend,
    /// Identity service key; when present conversations are scoped per user.
    pub auth_api_key: Option<String>,
    pub scope: Scope,
    pub turn_policy: TurnPolicy,
    pub typewriter_tick: Duration,
}

pub fn turn_policy_from_str(raw: &str) -> Result<TurnPolicy, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "queue" => Ok(TurnPolicy::Queue),
        "reject" => Ok(TurnPolicy::Reject),
        "concurrent" | "legacy" => Ok(TurnPolicy::Concurrent),
        _ => Err(format!("Unknown turn policy: {raw}")),
    }
}

/// Environment view: first non-blank value among `keys`.
struct Env<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| (self.0)(k))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }

    fn ai(&self) -> AiConfig {
        let base_url = self
            .first(&["AI_BASE_URL", "LLM_BASE_URL"])
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let provider = self
            .first(&["AI_PROVIDER", "LLM_PROVIDER"])
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| AiProvider::infer(&base_url));

        AiConfig {
            provider,
            base_url: provider.normalize_base(&base_url),
            api_key: self
                .first(&["AI_API_KEY", "OPENAI_API_KEY", "LLM_API_KEY"])
                .unwrap_or_default(),
            model: self
                .first(&["AI_MODEL", "LLM_MODEL"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn store(&self) -> StoreBackend {
        if let Some(database_url) = self.first(&["FIREBASE_DATABASE_URL"]) {
            return StoreBackend::Realtime { database_url };
        }
        let remote = (
            self.first(&["TURSO_DATABASE_URL", "LIBSQL_DATABASE_URL"]),
            self.first(&["TURSO_AUTH_TOKEN", "LIBSQL_AUTH_TOKEN"]),
        );
        if let (Some(url), Some(token)) = remote {
            return StoreBackend::RemoteLibsql { url, token };
        }
        StoreBackend::LocalFile {
            path: self.first(&["KNOWITALL_DB_PATH"]).map(PathBuf::from),
        }
    }

    fn app(&self) -> AppConfig {
        let auth_api_key = self.first(&["FIREBASE_API_KEY"]);
        let scope = match auth_api_key {
            Some(_) => Scope::PerUser,
            None => Scope::Shared,
        };

        let turn_policy = match self.first(&["KNOWITALL_TURN_POLICY"]) {
            Some(raw) => turn_policy_from_str(&raw).unwrap_or_else(|err| {
                log::warn!("{}, using queue", err);
                TurnPolicy::default()
            }),
            None => TurnPolicy::default(),
        };

        let typewriter_ms = self
            .first(&["KNOWITALL_TYPEWRITER_MS"])
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TYPEWRITER_MS)
            .min(2_000);

        AppConfig {
            ai: self.ai(),
            store: self.store(),
            auth_api_key,
            scope,
            turn_policy,
            typewriter_tick: Duration::from_millis(typewriter_ms),
        }
    }
}

fn process_env() -> Env<impl Fn(&str) -> Option<String>> {
    let _ = dotenvy::dotenv();
    Env(|key: &str| std::env::var(key).ok())
}

/// Load AI configuration from `.env`/environment.
///
/// Reads:
/// - `AI_BASE_URL` (fallback: `LLM_BASE_URL`)
/// - `AI_PROVIDER` (fallback: `LLM_PROVIDER`)
/// - `AI_API_KEY` (fallback: `OPENAI_API_KEY`, `LLM_API_KEY`)
/// - `AI_MODEL` (fallback: `LLM_MODEL`)
pub fn load_ai_config() -> AiConfig {
    process_env().ai()
}

/// Load everything the app needs from `.env`/environment.
///
/// Besides the AI variables this reads `FIREBASE_DATABASE_URL`,
/// `FIREBASE_API_KEY`, `TURSO_*`/`LIBSQL_*`, `KNOWITALL_DB_PATH`,
/// `KNOWITALL_TURN_POLICY` (`queue|reject|concurrent`) and
/// `KNOWITALL_TYPEWRITER_MS`.
pub fn load_app_config() -> AppConfig {
    process_env().app()
}

/// Public AI configuration (secrets omitted).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPublicConfig {
    pub provider: AiProvider,
    pub base_url: String,
    pub model: String,
    pub has_api_key: bool,
}

impl From<&AiConfig> for AiPublicConfig {
    fn from(config: &AiConfig) -> Self {
        Self {
            provider: config.provider,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            has_api_key: !config.api_key.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> Env<impl Fn(&str) -> Option<String>> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Env(move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_provider_inference_and_base() {
        let cases = [
            ("https://api.deepseek.com/v1", AiProvider::DeepSeek, "https://api.deepseek.com"),
            ("https://api.openai.com", AiProvider::OpenAI, "https://api.openai.com/v1"),
            ("https://api.openai.com/v1/", AiProvider::OpenAI, "https://api.openai.com/v1"),
            ("http://localhost:11434/v1", AiProvider::Compatible, "http://localhost:11434/v1"),
        ];
        for (base, provider, normalized) in cases {
            assert_eq!(AiProvider::infer(base), provider, "{base}");
            assert_eq!(provider.normalize_base(base), normalized, "{base}");
        }
        assert_eq!("OpenAI-Compatible".parse::<AiProvider>(), Ok(AiProvider::Compatible));
        assert!("skynet".parse::<AiProvider>().is_err());
    }

    #[test]
    fn test_defaults_without_env() {
        let config = env(&[]).app();
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert!(config.ai.api_key.is_empty());
        assert_eq!(config.store, StoreBackend::LocalFile { path: None });
        assert_eq!(config.scope, Scope::Shared);
        assert_eq!(config.turn_policy, TurnPolicy::Queue);
        assert_eq!(config.typewriter_tick, Duration::from_millis(50));
    }

    #[test]
    fn test_env_selects_backends_and_scope() {
        let config = env(&[
            ("LLM_API_KEY", "sk-1"),
            ("AI_API_KEY", "  "),
            ("FIREBASE_DATABASE_URL", "https://demo.firebaseio.com"),
            ("FIREBASE_API_KEY", "fb-key"),
            ("KNOWITALL_TURN_POLICY", "Reject"),
            ("KNOWITALL_TYPEWRITER_MS", "0"),
        ])
        .app();
        assert_eq!(config.ai.api_key, "sk-1");
        assert_eq!(
            config.store,
            StoreBackend::Realtime {
                database_url: "https://demo.firebaseio.com".into()
            }
        );
        assert_eq!(config.scope, Scope::PerUser);
        assert_eq!(config.turn_policy, TurnPolicy::Reject);
        assert!(config.typewriter_tick.is_zero());

        let remote = env(&[("TURSO_DATABASE_URL", "libsql://x"), ("TURSO_AUTH_TOKEN", "t")]).store();
        assert_eq!(
            remote,
            StoreBackend::RemoteLibsql {
                url: "libsql://x".into(),
                token: "t".into()
            }
        );
    }

    #[test]
    fn test_turn_policy_names() {
        assert_eq!(turn_policy_from_str(" Queue "), Ok(TurnPolicy::Queue));
        assert_eq!(turn_policy_from_str("legacy"), Ok(TurnPolicy::Concurrent));
        assert!(turn_policy_from_str("sometimes").is_err());
        assert_eq!(env(&[("KNOWITALL_TURN_POLICY", "bogus")]).app().turn_policy, TurnPolicy::Queue);
    }

    #[test]
    fn test_public_config_hides_key() {
        let config = AiConfig {
            api_key: "sk-secret".into(),
            ..AiConfig::default()
        };
        let public = AiPublicConfig::from(&config);
        assert!(public.has_api_key);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
