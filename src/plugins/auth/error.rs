#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication is not configured")]
    NotConfigured,
    #[error("Not signed in")]
    SignedOut,
    #[error("{0}")]
    InvalidInput(String),
    /// The identity service refused the request (`EMAIL_EXISTS`, `INVALID_PASSWORD`, ...).
    #[error("{}", describe_code(.code, .detail.as_deref()))]
    Rejected { code: String, detail: Option<String> },
    #[error("Authentication request failed: {0}")]
    Transport(String),
    #[error("Unexpected authentication response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Split `"WEAK_PASSWORD : Password should be at least 6 characters"` into code and detail.
    pub fn rejected(message: &str) -> Self {
        match message.split_once(':') {
            Some((code, detail)) => Self::Rejected {
                code: code.trim().to_string(),
                detail: Some(detail.trim().to_string()).filter(|d| !d.is_empty()),
            },
            None => Self::Rejected {
                code: message.trim().to_string(),
                detail: None,
            },
        }
    }
}

fn describe_code(code: &str, detail: Option<&str>) -> String {
    let friendly = match code {
        "EMAIL_EXISTS" => "That email is already registered",
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Email or password is incorrect"
        }
        "USER_DISABLED" => "This account has been disabled",
        "INVALID_EMAIL" => "That email address is not valid",
        "WEAK_PASSWORD" => "Password is too weak",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, try again later",
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" => "Session expired, please sign in again",
        _ => "",
    };
    match (friendly.is_empty(), detail) {
        (true, Some(detail)) => format!("{code}: {detail}"),
        (true, None) => code.to_string(),
        (false, Some(detail)) => format!("{friendly} ({detail})"),
        (false, None) => friendly.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_splits_detail() {
        let err = AuthError::rejected("WEAK_PASSWORD : Password should be at least 6 characters");
        assert_eq!(
            err,
            AuthError::Rejected {
                code: "WEAK_PASSWORD".into(),
                detail: Some("Password should be at least 6 characters".into()),
            }
        );
        assert_eq!(
            err.to_string(),
            "Password is too weak (Password should be at least 6 characters)"
        );
    }

    #[test]
    fn test_unknown_code_is_shown_verbatim() {
        assert_eq!(AuthError::rejected("OPERATION_NOT_ALLOWED").to_string(), "OPERATION_NOT_ALLOWED");
        assert_eq!(
            AuthError::rejected("EMAIL_EXISTS").to_string(),
            "That email is already registered"
        );
    }
}
