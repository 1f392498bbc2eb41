//! Speech-bubble rendering behind a `ViewModel`.

mod presenter;
mod terminal;
mod typewriter;
mod view;

pub use presenter::{follow_conversation, Presenter, RenderHold, Reveal};
pub use terminal::TerminalView;
pub use typewriter::{prefixes, Typewriter, DEFAULT_TICK};
pub use view::{Bubble, BubbleId, RenderCommand, ViewModel, ViewState};

#[cfg(test)]
pub(crate) use view::testing::RecordingView;
