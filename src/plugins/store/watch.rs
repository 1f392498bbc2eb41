use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{Snapshot, StorePath};

/// Live view of one path. Yields the current value first, then a fresh
/// snapshot after every mutation that touches the path.
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(path: StorePath, rx: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self {
            path,
            rx,
            task: None,
        }
    }

    /// Attach the task feeding this subscription; it is aborted on drop.
    pub(crate) fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next snapshot. `None` once the feed has ended.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Drain whatever is queued and keep only the newest snapshot.
    pub fn latest(&mut self) -> Option<Snapshot> {
        let mut latest = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Watcher {
    path: StorePath,
    tx: mpsc::UnboundedSender<Snapshot>,
}

/// Fan-out registry for backends that observe their own writes.
#[derive(Default)]
pub(crate) struct Watchers {
    inner: Mutex<Vec<Watcher>>,
}

impl Watchers {
    pub(crate) fn register(&self, path: StorePath, initial: Snapshot) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(initial);
        if let Ok(mut watchers) = self.inner.lock() {
            watchers.push(Watcher {
                path: path.clone(),
                tx,
            });
        }
        Subscription::new(path, rx)
    }

    /// Watchers whose view changes when `changed` is written. Closed ones are pruned.
    pub(crate) fn affected(
        &self,
        changed: &StorePath,
    ) -> Vec<(StorePath, mpsc::UnboundedSender<Snapshot>)> {
        let Ok(mut watchers) = self.inner.lock() else {
            return Vec::new();
        };
        watchers.retain(|w| !w.tx.is_closed());
        watchers
            .iter()
            .filter(|w| w.path.overlaps(changed))
            .map(|w| (w.path.clone(), w.tx.clone()))
            .collect()
    }

    pub(crate) fn notify_with(&self, changed: &StorePath, read: impl Fn(&StorePath) -> Snapshot) {
        for (path, tx) in self.affected(changed) {
            let _ = tx.send(read(&path));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().map(|w| w.len()).unwrap_or(0)
    }
}
