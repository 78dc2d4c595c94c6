//! In-process collaborators for exercising the full command lifecycle
//! without a wallet, a ledger node or a real encryption engine.
//!
//! The engine stashes plaintexts in a local vault keyed by handle; the
//! ledger stores the handle as the entry's ciphertext and hands it back on
//! request. Nothing here is cryptography, only the collaborator contracts.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use client_core::{
    DisclosureVerifier, EncryptionEngine, FinalityHandle, LedgerContract, WalletSession,
};
use shared::{
    domain::{AccountId, CiphertextHandle, CommandId, ContractAddress},
    protocol::{DisclosureResult, EncryptedInput, LedgerEntry, SubmitEntryRequest},
};
use tokio::sync::Mutex;

pub struct LoopbackWallet {
    account: AccountId,
}

impl LoopbackWallet {
    pub fn new(account: AccountId) -> Self {
        Self { account }
    }
}

impl WalletSession for LoopbackWallet {
    fn is_connected(&self) -> bool {
        true
    }

    fn account_id(&self) -> Option<AccountId> {
        Some(self.account.clone())
    }
}

#[derive(Default)]
pub struct LoopbackEngine {
    vault: Mutex<HashMap<CiphertextHandle, u64>>,
    next_handle: AtomicU64,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EncryptionEngine for LoopbackEngine {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn encrypt(
        &self,
        _contract: &ContractAddress,
        _account: &AccountId,
        plain_value: u8,
    ) -> Result<EncryptedInput> {
        let handle = CiphertextHandle::new(format!(
            "0xhandle{:04x}",
            self.next_handle.fetch_add(1, Ordering::SeqCst)
        ));
        self.vault
            .lock()
            .await
            .insert(handle.clone(), u64::from(plain_value));
        Ok(EncryptedInput {
            ciphertext: handle.as_str().as_bytes().to_vec(),
            proof: b"loopback-input-proof".to_vec(),
        })
    }

    async fn request_disclosure_proof(
        &self,
        handles: &[CiphertextHandle],
        _contract: &ContractAddress,
        verifier: &dyn DisclosureVerifier,
    ) -> Result<DisclosureResult> {
        let mut payload = Vec::with_capacity(handles.len());
        let mut clear_values = HashMap::with_capacity(handles.len());
        {
            let vault = self.vault.lock().await;
            for handle in handles {
                let value = vault
                    .get(handle)
                    .copied()
                    .ok_or_else(|| anyhow!("no ciphertext behind handle {handle}"))?;
                payload.push((handle.as_str().to_string(), value));
                clear_values.insert(handle.clone(), value);
            }
        }

        let encoded = STANDARD.encode(serde_json::to_vec(&payload)?);
        verifier.verify(&encoded, b"loopback-reveal-proof").await?;
        Ok(DisclosureResult { clear_values })
    }
}

struct StoredEntry {
    created_at: i64,
    creator: AccountId,
    is_verified: bool,
    clear_value: u64,
    ciphertext: Vec<u8>,
}

#[derive(Default)]
struct LedgerState {
    entries: HashMap<CommandId, StoredEntry>,
    order: Vec<CommandId>,
}

pub struct LoopbackLedger {
    caller: AccountId,
    state: Mutex<LedgerState>,
}

impl LoopbackLedger {
    pub fn new(caller: AccountId) -> Self {
        Self {
            caller,
            state: Mutex::new(LedgerState::default()),
        }
    }
}

struct InstantFinality;

#[async_trait]
impl FinalityHandle for InstantFinality {
    async fn wait_final(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LedgerContract for LoopbackLedger {
    async fn list_ids(&self) -> Result<Vec<CommandId>> {
        Ok(self.state.lock().await.order.clone())
    }

    async fn get_entry(&self, id: &CommandId) -> Result<LedgerEntry> {
        let state = self.state.lock().await;
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| anyhow!("unknown command id {id}"))?;
        Ok(LedgerEntry {
            created_at: entry.created_at,
            creator: entry.creator.clone(),
            is_verified: entry.is_verified,
            clear_value: entry.clear_value,
        })
    }

    async fn get_ciphertext_handle(&self, id: &CommandId) -> Result<CiphertextHandle> {
        let state = self.state.lock().await;
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| anyhow!("unknown command id {id}"))?;
        let handle = String::from_utf8(entry.ciphertext.clone())
            .map_err(|_| anyhow!("stored ciphertext for {id} is not a handle"))?;
        Ok(CiphertextHandle::new(handle))
    }

    async fn check_availability(&self) -> Result<Box<dyn FinalityHandle>> {
        Ok(Box::new(InstantFinality))
    }

    async fn submit_entry(&self, request: SubmitEntryRequest) -> Result<Box<dyn FinalityHandle>> {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(&request.id) {
            return Err(anyhow!("entry {} already exists", request.id));
        }
        state.entries.insert(
            request.id.clone(),
            StoredEntry {
                created_at: Utc::now().timestamp(),
                creator: self.caller.clone(),
                is_verified: false,
                clear_value: 0,
                ciphertext: request.ciphertext,
            },
        );
        state.order.push(request.id);
        Ok(Box::new(InstantFinality))
    }

    async fn submit_disclosure_proof(
        &self,
        id: &CommandId,
        clear_values_encoded: &str,
        _proof: &[u8],
    ) -> Result<Box<dyn FinalityHandle>> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown command id {id}"))?;
        if entry.is_verified {
            return Err(anyhow!("Data already verified"));
        }

        let raw = STANDARD.decode(clear_values_encoded)?;
        let values: Vec<(String, u64)> = serde_json::from_slice(&raw)?;
        let (_, value) = values
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("empty clear values payload"))?;
        entry.is_verified = true;
        entry.clear_value = value;
        Ok(Box::new(InstantFinality))
    }
}
