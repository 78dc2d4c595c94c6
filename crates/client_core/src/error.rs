use shared::domain::{CommandId, COMMAND_VALUE_MAX, COMMAND_VALUE_MIN};
use thiserror::Error;

use crate::WorkflowKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not ready: connect a wallet and initialize the encryption engine first")]
    NotReady,
    #[error("{workflow} is already in flight")]
    Busy { workflow: WorkflowKind },
    #[error("command value {0} is outside the supported range {COMMAND_VALUE_MIN}..={COMMAND_VALUE_MAX}")]
    InvalidCommandValue(u8),
    #[error("encryption engine initialization failed: {0}")]
    EngineInit(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("transaction rejected by user")]
    TransactionRejected,
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("registry reload failed: {0}")]
    ReloadFailed(String),
    #[error("unknown command id {0}")]
    UnknownCommand(CommandId),
    #[error("disclosure failed: {0}")]
    Disclosure(String),
}
