use std::time::Duration;

use tokio::sync::watch;

pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Growing prefixes of `text`, one more character each step.
pub fn prefixes(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.char_indices()
        .skip(1)
        .map(|(i, _)| &text[..i])
        .chain((!text.is_empty()).then_some(text))
}

/// Progressive reveal: emits one growing prefix per tick until the text is
/// complete or the cancel generation moves on.
pub struct Typewriter {
    tick: Duration,
    cancel: watch::Receiver<u64>,
    generation: u64,
}

impl Typewriter {
    /// Bound to the generation currently in `cancel`; any later value stops it.
    pub fn new(tick: Duration, cancel: watch::Receiver<u64>) -> Self {
        let generation = *cancel.borrow();
        Self {
            tick,
            cancel,
            generation,
        }
    }

    pub fn is_instant(&self) -> bool {
        self.tick.is_zero()
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow() != self.generation
    }

    /// Returns `true` when the full text was shown, `false` if cancelled.
    pub async fn run(mut self, text: &str, mut on_frame: impl FnMut(&str)) -> bool {
        if self.cancelled() {
            return false;
        }
        if self.is_instant() {
            on_frame(text);
            return true;
        }

        let mut interval = tokio::time::interval(self.tick);
        // First tick completes immediately; the first character waits one tick.
        interval.tick().await;

        for frame in prefixes(text) {
            tokio::select! {
                _ = interval.tick() => {}
                changed = self.cancel.changed() => {
                    if changed.is_err() || self.cancelled() {
                        return false;
                    }
                    interval.tick().await;
                }
            }
            if self.cancelled() {
                return false;
            }
            on_frame(frame);
        }
        true
    }
}
