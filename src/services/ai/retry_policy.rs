use async_openai::error::OpenAIError;

const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "overload",
    "temporarily",
    "timeout",
    "timed out",
    "server_error",
];

fn mentions_transient(parts: &[Option<&str>]) -> bool {
    parts.iter().flatten().any(|part| {
        let part = part.to_ascii_lowercase();
        TRANSIENT_MARKERS.iter().any(|marker| part.contains(marker))
    })
}

/// Failures worth another attempt when retries are enabled.
pub(super) fn is_transient(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status()
                    .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
        }
        OpenAIError::ApiError(api) => mentions_transient(&[
            Some(api.message.as_str()),
            api.code.as_deref(),
            api.r#type.as_deref(),
        ]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_markers() {
        assert!(mentions_transient(&[Some("Rate limit reached for gpt-4o-mini")]));
        assert!(mentions_transient(&[Some("bad"), None, Some("server_error")]));
        assert!(mentions_transient(&[Some("The engine is currently Overloaded")]));
        assert!(!mentions_transient(&[Some("Incorrect API key provided"), Some("invalid_api_key")]));
        assert!(!mentions_transient(&[None, None]));
    }

    #[test]
    fn test_argument_errors_are_final() {
        assert!(!is_transient(&OpenAIError::InvalidArgument("model".into())));
    }
}
