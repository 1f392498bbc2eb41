use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreError {
    /// No session path is set; the caller must sign in first.
    #[error("Unavailable: {message}")]
    Unavailable { message: String },
    #[error("NotFound: {message}")]
    NotFound { message: String },
    #[error("PermissionDenied: {message}")]
    PermissionDenied { message: String },
    #[error("InvalidInput: {message}")]
    InvalidInput { message: String },
    #[error("Database: {message}")]
    Database { message: String },
    #[error("Transport: {message}")]
    Transport { message: String },
    #[error("Internal: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unavailable { message }
            | Self::NotFound { message }
            | Self::PermissionDenied { message }
            | Self::InvalidInput { message }
            | Self::Database { message }
            | Self::Transport { message }
            | Self::Internal { message } => message,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<libsql::Error> for StoreError {
    fn from(err: libsql::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
            {
                return Self::permission_denied(err.to_string());
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Self::not_found(err.to_string());
            }
        }
        Self::transport(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("Invalid JSON in store: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_tagged() {
        let err = StoreError::unavailable("no session");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "unavailable");
        assert_eq!(json["message"], "no session");
        assert_eq!(err.to_string(), "Unavailable: no session");
        assert!(err.is_unavailable());
    }
}
