use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};

const SUCCESS_CLEAR_DELAY: Duration = Duration::from_secs(2);
const ERROR_CLEAR_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Shown { status: Status, message: String },
    Cleared,
}

/// Transient pending/success/error signal for the UI. Owns no domain state;
/// its only contract is that terminal notifications are eventually cleared.
///
/// Auto-dismissal runs on an explicitly tracked task that is aborted when a
/// newer notification replaces it and when the notifier is dropped, so no
/// clear fires after teardown.
pub struct StatusNotifier {
    updates: broadcast::Sender<StatusUpdate>,
    current: Arc<Mutex<Option<Status>>>,
    clear_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusNotifier {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            updates,
            current: Arc::new(Mutex::new(None)),
            clear_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    pub async fn current(&self) -> Option<Status> {
        *self.current.lock().await
    }

    /// Pending has no auto-dismissal; it stays visible until a terminal
    /// notification replaces it.
    pub async fn pending(&self, message: impl Into<String>) {
        self.show(Status::Pending, message.into(), None).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.show(Status::Success, message.into(), Some(SUCCESS_CLEAR_DELAY))
            .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.show(Status::Error, message.into(), Some(ERROR_CLEAR_DELAY))
            .await;
    }

    async fn show(&self, status: Status, message: String, clear_after: Option<Duration>) {
        if let Some(task) = self.clear_task.lock().await.take() {
            task.abort();
        }

        *self.current.lock().await = Some(status);
        let _ = self.updates.send(StatusUpdate::Shown { status, message });

        if let Some(delay) = clear_after {
            let updates = self.updates.clone();
            let current = Arc::clone(&self.current);
            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                *current.lock().await = None;
                let _ = updates.send(StatusUpdate::Cleared);
            });
            *self.clear_task.lock().await = Some(task);
        }
    }
}

impl Drop for StatusNotifier {
    fn drop(&mut self) {
        if let Some(task) = self.clear_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/notifier_tests.rs"]
mod tests;
