//! Centralized prompts and canned texts.
//!
//! Single source of truth for the system instruction, the greeting shown on
//! an empty conversation and the suggestion prompts. Edit this file to
//! customize the assistant's persona.

// ============================================================================
// SYSTEM PROMPTS
// ============================================================================

/// Fixed preamble sent before every completion call.
pub const SYSTEM_PROMPT_DEFAULT: &str =
    "You are a highly knowledgeable assistant that is always happy to help.";

// ============================================================================
// CANNED UI TEXT
// ============================================================================

/// Shown instead of replaying history when a conversation is empty.
pub const GREETING: &str = "How can I help?";

/// Prompts offered as one-click suggestions; picking one submits its text.
pub const SUGGESTIONS: &[&str] = &[
    "Explain how the internet works in simple terms.",
    "Give me three ideas for a weekend project.",
    "What is a good way to start learning a new language?",
    "Summarize the plot of a famous novel in two sentences.",
];

pub fn suggestion(index: usize) -> Option<&'static str> {
    SUGGESTIONS.get(index).copied()
}
