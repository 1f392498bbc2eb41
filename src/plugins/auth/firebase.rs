use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthProvider, Session};

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

/// Email/password accounts on the hosted identity service (REST).
pub struct FirebaseAuth {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountReply {
    local_id: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>, http: reqwest::Client) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::NotConfigured);
        }
        Ok(Self {
            api_key,
            base_url: IDENTITY_TOOLKIT_BASE.to_string(),
            http,
        })
    }

    /// Point at an emulator or proxy instead of the hosted endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<AccountReply, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        parse_reply(status, &text)
    }
}

fn parse_reply(status: reqwest::StatusCode, body: &str) -> Result<AccountReply, AuthError> {
    if !status.is_success() {
        return Err(match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => AuthError::rejected(&envelope.error.message),
            Err(_) => AuthError::Transport(format!("HTTP {status}")),
        });
    }
    serde_json::from_str(body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
}

/// Build a session from a reply; fields the reply omits carry over from `previous`.
fn into_session(reply: AccountReply, previous: Option<&Session>) -> Result<Session, AuthError> {
    let id_token = reply
        .id_token
        .or_else(|| previous.map(|s| s.id_token.clone()))
        .ok_or_else(|| AuthError::MalformedResponse("missing idToken".to_string()))?;

    Ok(Session {
        uid: reply.local_id,
        id_token,
        refresh_token: reply
            .refresh_token
            .or_else(|| previous.and_then(|s| s.refresh_token.clone())),
        email: reply.email.or_else(|| previous.and_then(|s| s.email.clone())),
        display_name: reply
            .display_name
            .filter(|n| !n.is_empty())
            .or_else(|| previous.and_then(|s| s.display_name.clone())),
    })
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let reply = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        into_session(reply, None)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let reply = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        into_session(reply, None)
    }

    async fn update_profile(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Session, AuthError> {
        let reply = self
            .call(
                "update",
                &UpdateProfileRequest {
                    id_token: &session.id_token,
                    display_name,
                    return_secure_token: false,
                },
            )
            .await?;
        into_session(reply, Some(session))
    }
}
