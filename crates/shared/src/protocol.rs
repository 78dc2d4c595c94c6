use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, CiphertextHandle, CommandId};

/// Ciphertext plus the validity proof binding it to a target contract and
/// submitter account, as produced by the encryption engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub ciphertext: Vec<u8>,
    pub proof: Vec<u8>,
}

/// Authoritative per-entry state as read back from the ledger contract.
///
/// `clear_value` is zero until a disclosure proof has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub created_at: i64,
    pub creator: AccountId,
    pub is_verified: bool,
    pub clear_value: u64,
}

/// Write-path payload for a new ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitEntryRequest {
    pub id: CommandId,
    pub label: String,
    pub ciphertext: Vec<u8>,
    pub proof: Vec<u8>,
    pub extra1: u64,
    pub extra2: u64,
    pub note: String,
}

/// Cleartext values recovered by the encryption engine, keyed by the
/// ciphertext handle they were requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureResult {
    pub clear_values: HashMap<CiphertextHandle, u64>,
}
