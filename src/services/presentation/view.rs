use serde::Serialize;

use crate::services::ai::Role;

pub type BubbleId = u64;

/// Everything the core ever asks a view to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderCommand {
    AppendBubble {
        id: BubbleId,
        role: Role,
        text: String,
        /// Text is still being revealed.
        typing: bool,
    },
    SetText {
        id: BubbleId,
        text: String,
    },
    FinishTyping {
        id: BubbleId,
    },
    Clear,
    ShowSuggestions(Vec<String>),
    HideSuggestions,
}

/// Render target. Implementations must not block; they are called from
/// async tasks.
pub trait ViewModel: Send + Sync {
    fn apply(&self, command: RenderCommand);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub id: BubbleId,
    pub role: Role,
    pub text: String,
    pub typing: bool,
}

/// Result of folding a command stream; what a view is showing right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub bubbles: Vec<Bubble>,
    pub suggestions: Option<Vec<String>>,
}

impl ViewState {
    pub fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::AppendBubble {
                id,
                role,
                text,
                typing,
            } => self.bubbles.push(Bubble {
                id,
                role,
                text,
                typing,
            }),
            RenderCommand::SetText { id, text } => {
                if let Some(bubble) = self.bubble_mut(id) {
                    bubble.text = text;
                }
            }
            RenderCommand::FinishTyping { id } => {
                if let Some(bubble) = self.bubble_mut(id) {
                    bubble.typing = false;
                }
            }
            RenderCommand::Clear => self.bubbles.clear(),
            RenderCommand::ShowSuggestions(list) => self.suggestions = Some(list),
            RenderCommand::HideSuggestions => self.suggestions = None,
        }
    }

    fn bubble_mut(&mut self, id: BubbleId) -> Option<&mut Bubble> {
        self.bubbles.iter_mut().find(|b| b.id == id)
    }

    /// Role and text of every bubble, ignoring ids.
    pub fn transcript(&self) -> Vec<(Role, String)> {
        self.bubbles
            .iter()
            .map(|b| (b.role, b.text.clone()))
            .collect()
    }
}
