//! Completion client for OpenAI-compatible chat APIs.
//!
//! Notes:
//! - We use `async-openai` for its HTTP client and error types.
//! - Requests go through async-openai's `byot` ("bring your own types")
//!   methods so we control the exact body (`presence_penalty`,
//!   `frequency_penalty`) and can read vendor fields like `reasoning_content`.

mod client;
mod retry_policy;
mod types;

pub use client::{CompletionClient, OpenAiCompletionClient};
pub use types::{ChatMessage, CompletionError, Role, SamplingConfig};
