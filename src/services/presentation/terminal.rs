use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use crate::services::ai::Role;

use super::view::{BubbleId, RenderCommand, ViewModel};

fn label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "bot",
        Role::System => "sys",
    }
}

/// Prints bubbles to stdout. Typing bubbles are written incrementally.
#[derive(Default)]
pub struct TerminalView {
    // Characters already printed per typing bubble.
    printed: Mutex<HashMap<BubbleId, usize>>,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewModel for TerminalView {
    fn apply(&self, command: RenderCommand) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        let mut out = std::io::stdout().lock();
        let _ = match command {
            RenderCommand::AppendBubble {
                id,
                role,
                text,
                typing,
            } => {
                if typing {
                    printed.insert(id, text.chars().count());
                    write!(out, "{}> {}", label(role), text)
                } else {
                    writeln!(out, "{}> {}", label(role), text)
                }
            }
            RenderCommand::SetText { id, text } => match printed.get_mut(&id) {
                Some(shown) => {
                    let rest: String = text.chars().skip(*shown).collect();
                    *shown += rest.chars().count();
                    write!(out, "{rest}")
                }
                None => Ok(()),
            },
            RenderCommand::FinishTyping { id } => match printed.remove(&id) {
                Some(_) => writeln!(out),
                None => Ok(()),
            },
            RenderCommand::Clear => {
                let dangling = !printed.is_empty();
                printed.clear();
                if dangling {
                    let _ = writeln!(out);
                }
                writeln!(out, "----------------")
            }
            RenderCommand::ShowSuggestions(list) => {
                let _ = writeln!(out, "Suggestions (use /suggest <n>):");
                for (i, item) in list.iter().enumerate() {
                    let _ = writeln!(out, "  [{i}] {item}");
                }
                Ok(())
            }
            RenderCommand::HideSuggestions => Ok(()),
        };
        let _ = out.flush();
    }
}
