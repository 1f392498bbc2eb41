//! Internal "plugin" modules (crate-local sub-systems).
//!
//! Regular Rust modules with a stable boundary so the conversation services
//! can depend on them without knowing which backend is in use.

pub mod auth;
pub mod store;
