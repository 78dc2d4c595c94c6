use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id_newtype!(CommandId);
opaque_id_newtype!(AccountId);
opaque_id_newtype!(ContractAddress);
opaque_id_newtype!(CiphertextHandle);

pub const COMMAND_VALUE_MIN: u8 = 1;
pub const COMMAND_VALUE_MAX: u8 = 7;

/// The fixed seven-command table. Labels are always recomputed from the
/// clear value, never stored.
const COMMAND_LABELS: [&str; 7] = [
    "Turn on lights",
    "Turn off lights",
    "Increase temperature",
    "Decrease temperature",
    "Open curtains",
    "Close curtains",
    "Play music",
];

pub fn is_valid_command_value(value: u8) -> bool {
    (COMMAND_VALUE_MIN..=COMMAND_VALUE_MAX).contains(&value)
}

pub fn command_label(value: u8) -> Option<&'static str> {
    if !is_valid_command_value(value) {
        return None;
    }
    Some(COMMAND_LABELS[usize::from(value) - 1])
}

/// One locally known voice command and its latest observed ledger state.
///
/// `clear_value` is present exactly when `is_verified` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub created_at: i64,
    pub creator: AccountId,
    pub is_verified: bool,
    pub clear_value: Option<u8>,
}

impl Command {
    pub fn label(&self) -> Option<&'static str> {
        self.clear_value.and_then(command_label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStats {
    pub total: usize,
    pub verified: usize,
    pub active_users: usize,
}

impl CommandStats {
    /// Pure derivation from the current command set; stats are never
    /// mutated independently of it.
    pub fn derive(commands: &[Command]) -> Self {
        let creators: HashSet<&str> = commands.iter().map(|c| c.creator.as_str()).collect();
        Self {
            total: commands.len(),
            verified: commands.iter().filter(|c| c.is_verified).count(),
            active_users: creators.len(),
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
