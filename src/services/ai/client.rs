use async_openai::error::OpenAIError;
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

use crate::services::config::AiConfig;
use crate::services::retry::RetryConfig;

use super::retry_policy::is_transient;
use super::types::{
    ByotChatCompletionResponse, ChatMessage, CompletionError, CompletionRequest, SamplingConfig,
};

/// Turns an assembled conversation into one assistant reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingConfig,
    ) -> Result<ChatMessage, CompletionError>;
}

impl From<OpenAIError> for CompletionError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::ApiError(api) => Self::Api(api.message),
            other => Self::Request(other.to_string()),
        }
    }
}

/// OpenAI-compatible chat-completion endpoint.
pub struct OpenAiCompletionClient {
    client: Client<OpenAIConfig>,
    retry: RetryConfig,
}

impl OpenAiCompletionClient {
    pub fn new(config: &AiConfig, http_client: reqwest::Client) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }
        let openai_config = OpenAIConfig::new()
            .with_api_base(config.base_url.clone())
            .with_api_key(config.api_key.clone());
        let client = Client::with_config(openai_config).with_http_client(http_client);
        Ok(Self {
            client,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        if retry.retries_enabled() {
            log::info!(
                "Completion retries enabled: up to {} attempts, backoff from {:?}",
                retry.max_attempts,
                retry.base_delay
            );
        }
        self.retry = retry;
        self
    }
}

pub(super) fn build_request<'a>(
    messages: &'a [ChatMessage],
    sampling: &'a SamplingConfig,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model: &sampling.model,
        messages,
        presence_penalty: sampling.presence_penalty,
        frequency_penalty: sampling.frequency_penalty,
    }
}

/// First choice's text. Reasoning models may leave `content` empty and put
/// the answer in `reasoning_content`.
pub(super) fn first_reply(response: ByotChatCompletionResponse) -> Result<ChatMessage, CompletionError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(CompletionError::EmptyResponse)?;

    let content = message
        .content
        .filter(|c| !c.trim().is_empty())
        .or(message.reasoning_content.filter(|c| !c.trim().is_empty()))
        .ok_or(CompletionError::EmptyResponse)?;

    Ok(ChatMessage::assistant(content.trim().to_string()))
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingConfig,
    ) -> Result<ChatMessage, CompletionError> {
        let request = build_request(messages, sampling);
        let mut last_error: Option<CompletionError> = None;

        for attempt in 1..=self.retry.max_attempts {
            match self
                .client
                .chat()
                .create_byot::<_, ByotChatCompletionResponse>(&request)
                .await
            {
                Ok(response) => return first_reply(response),
                Err(err) => {
                    if attempt < self.retry.max_attempts && is_transient(&err) {
                        log::warn!(
                            "Retry attempt {}/{} after error: {}",
                            attempt + 1,
                            self.retry.max_attempts,
                            err
                        );
                        last_error = Some(err.into());
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CompletionError::Request("Retry limit exceeded".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![
            ChatMessage::system("be nice"),
            ChatMessage::user("hello"),
        ];
        let sampling = SamplingConfig::new("gpt-4o-mini");
        let body = serde_json::to_value(build_request(&messages, &sampling)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hello"}
                ],
                "presence_penalty": 0.0,
                "frequency_penalty": 0.3
            })
        );
    }

    #[test]
    fn test_first_reply_takes_first_choice() {
        let response: ByotChatCompletionResponse = serde_json::from_value(json!({
            "choices": [
                {"message": {"role": "assistant", "content": " Hi there \n"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        }))
        .unwrap();
        assert_eq!(first_reply(response).unwrap(), ChatMessage::assistant("Hi there"));
    }

    #[test]
    fn test_first_reply_falls_back_to_reasoning() {
        let response: ByotChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "", "reasoning_content": "Thought answer"}}]
        }))
        .unwrap();
        assert_eq!(first_reply(response).unwrap().content, "Thought answer");
    }

    #[test]
    fn test_empty_choices_is_error() {
        let response: ByotChatCompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(first_reply(response).unwrap_err(), CompletionError::EmptyResponse);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = AiConfig::default();
        assert!(matches!(
            OpenAiCompletionClient::new(&config, reqwest::Client::new()),
            Err(CompletionError::MissingApiKey)
        ));
    }
}
