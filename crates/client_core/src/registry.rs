use std::sync::Arc;

use shared::domain::{Command, CommandId, CommandStats};
use tokio::sync::RwLock;

/// Locally known commands, kept as an immutable snapshot behind a lock.
///
/// Every mutation builds a new snapshot and swaps it in whole, so a reader
/// holding a snapshot never observes a partially applied reload.
pub struct CommandRegistry {
    commands: RwLock<Arc<Vec<Command>>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub async fn snapshot(&self) -> Arc<Vec<Command>> {
        Arc::clone(&*self.commands.read().await)
    }

    pub async fn get(&self, id: &CommandId) -> Option<Command> {
        self.commands
            .read()
            .await
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }

    /// Replaces the whole command set with a freshly reconstructed one.
    pub async fn replace(&self, commands: Vec<Command>) {
        *self.commands.write().await = Arc::new(commands);
    }

    /// Appends a new command. Ids are immutable and unique; an entry whose
    /// id is already present is rejected.
    pub async fn append(&self, command: Command) -> bool {
        let mut guard = self.commands.write().await;
        if guard.iter().any(|c| c.id == command.id) {
            return false;
        }
        let mut next = guard.as_ref().clone();
        next.push(command);
        *guard = Arc::new(next);
        true
    }

    /// Transitions a command to verified with its cleartext value.
    /// Verification is monotonic: a command that is already verified keeps
    /// its existing value. Returns false when the id is unknown.
    pub async fn mark_verified(&self, id: &CommandId, clear_value: u8) -> bool {
        let mut guard = self.commands.write().await;
        let Some(index) = guard.iter().position(|c| &c.id == id) else {
            return false;
        };
        if guard[index].is_verified {
            return true;
        }
        let mut next = guard.as_ref().clone();
        next[index].is_verified = true;
        next[index].clear_value = Some(clear_value);
        *guard = Arc::new(next);
        true
    }

    pub async fn stats(&self) -> CommandStats {
        CommandStats::derive(&self.commands.read().await)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
