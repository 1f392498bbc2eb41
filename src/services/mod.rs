pub mod ai;
pub mod config;
pub mod conversation;
pub(crate) mod paths;
pub mod presentation;
pub mod prompts;
pub mod retry;
