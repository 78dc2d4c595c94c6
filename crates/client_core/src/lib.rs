use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{
        is_valid_command_value, AccountId, CiphertextHandle, Command, CommandId, CommandStats,
        ContractAddress,
    },
    protocol::{DisclosureResult, EncryptedInput, LedgerEntry, SubmitEntryRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod error;
pub mod gate;
pub mod notifier;
pub mod registry;

pub use error::ClientError;
pub use gate::{GateState, ReadinessGate};
pub use notifier::{Status, StatusNotifier, StatusUpdate};
pub use registry::CommandRegistry;

/// Label and note recorded alongside every submitted entry. The plaintext
/// command never appears in either; they only mark the entry kind.
const SUBMIT_ENTRY_LABEL: &str = "Voice Command";
const SUBMIT_ENTRY_NOTE: &str = "Encrypted voice command";

/// Upper bound on waiting for transaction finality. Collaborators signal
/// failure through their own rejection errors; this bound only prevents an
/// unbounded suspension when a collaborator never answers.
const FINALITY_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

fn is_user_rejected_error(err: &anyhow::Error) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains("user rejected")
}

fn is_already_verified_error(err: &anyhow::Error) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains("already verified")
}

fn is_unknown_entry_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("not found") || msg.contains("unknown command")
}

/// Wallet/session collaborator: connection state and the caller identity.
pub trait WalletSession: Send + Sync {
    fn is_connected(&self) -> bool;
    fn account_id(&self) -> Option<AccountId>;
}

/// Ledger-side acceptance of a claimed set of clear values. Injected into
/// [`EncryptionEngine::request_disclosure_proof`] so the engine's mid-workflow
/// call back into the ledger stays a mockable seam instead of a closure.
#[async_trait]
pub trait DisclosureVerifier: Send + Sync {
    async fn verify(&self, clear_values_encoded: &str, proof: &[u8]) -> Result<()>;
}

/// Homomorphic-encryption engine collaborator.
#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    /// Safe to call once per session; the readiness gate guarantees a single
    /// outstanding attempt.
    async fn initialize(&self) -> Result<()>;

    /// Produces a ciphertext and validity proof bound to the target contract
    /// and submitter account.
    async fn encrypt(
        &self,
        contract: &ContractAddress,
        account: &AccountId,
        plain_value: u8,
    ) -> Result<EncryptedInput>;

    /// Obtains a cleartext-reveal proof for the given handles and drives it
    /// through the supplied on-chain verifier before returning the recovered
    /// clear values.
    async fn request_disclosure_proof(
        &self,
        handles: &[CiphertextHandle],
        contract: &ContractAddress,
        verifier: &dyn DisclosureVerifier,
    ) -> Result<DisclosureResult>;
}

/// A dispatched ledger transaction whose finality must be awaited before the
/// owning workflow proceeds.
#[async_trait]
pub trait FinalityHandle: Send + Sync {
    async fn wait_final(&self) -> Result<()>;
}

/// Ledger contract collaborator.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    async fn list_ids(&self) -> Result<Vec<CommandId>>;
    async fn get_entry(&self, id: &CommandId) -> Result<LedgerEntry>;
    async fn get_ciphertext_handle(&self, id: &CommandId) -> Result<CiphertextHandle>;
    async fn check_availability(&self) -> Result<Box<dyn FinalityHandle>>;
    async fn submit_entry(&self, request: SubmitEntryRequest) -> Result<Box<dyn FinalityHandle>>;
    async fn submit_disclosure_proof(
        &self,
        id: &CommandId,
        clear_values_encoded: &str,
        proof: &[u8],
    ) -> Result<Box<dyn FinalityHandle>>;
}

pub struct MissingWalletSession;

impl WalletSession for MissingWalletSession {
    fn is_connected(&self) -> bool {
        false
    }

    fn account_id(&self) -> Option<AccountId> {
        None
    }
}

pub struct MissingEncryptionEngine;

#[async_trait]
impl EncryptionEngine for MissingEncryptionEngine {
    async fn initialize(&self) -> Result<()> {
        Err(anyhow!("encryption engine is unavailable"))
    }

    async fn encrypt(
        &self,
        _contract: &ContractAddress,
        _account: &AccountId,
        _plain_value: u8,
    ) -> Result<EncryptedInput> {
        Err(anyhow!("encryption engine is unavailable"))
    }

    async fn request_disclosure_proof(
        &self,
        _handles: &[CiphertextHandle],
        _contract: &ContractAddress,
        _verifier: &dyn DisclosureVerifier,
    ) -> Result<DisclosureResult> {
        Err(anyhow!("encryption engine is unavailable"))
    }
}

pub struct MissingLedgerContract;

#[async_trait]
impl LedgerContract for MissingLedgerContract {
    async fn list_ids(&self) -> Result<Vec<CommandId>> {
        Err(anyhow!("ledger contract is unavailable"))
    }

    async fn get_entry(&self, id: &CommandId) -> Result<LedgerEntry> {
        Err(anyhow!("ledger contract is unavailable for entry {id}"))
    }

    async fn get_ciphertext_handle(&self, id: &CommandId) -> Result<CiphertextHandle> {
        Err(anyhow!("ledger contract is unavailable for entry {id}"))
    }

    async fn check_availability(&self) -> Result<Box<dyn FinalityHandle>> {
        Err(anyhow!("ledger contract is unavailable"))
    }

    async fn submit_entry(&self, _request: SubmitEntryRequest) -> Result<Box<dyn FinalityHandle>> {
        Err(anyhow!("ledger contract is unavailable"))
    }

    async fn submit_disclosure_proof(
        &self,
        id: &CommandId,
        _clear_values_encoded: &str,
        _proof: &[u8],
    ) -> Result<Box<dyn FinalityHandle>> {
        Err(anyhow!("ledger contract is unavailable for entry {id}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    Submission,
    Disclosure,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowKind::Submission => "submission workflow",
            WorkflowKind::Disclosure => "disclosure workflow",
        };
        f.write_str(name)
    }
}

async fn await_finality(tx: Box<dyn FinalityHandle>) -> Result<()> {
    match tokio::time::timeout(FINALITY_WAIT_TIMEOUT, tx.wait_final()).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "transaction finality wait timed out after {}s",
            FINALITY_WAIT_TIMEOUT.as_secs()
        )),
    }
}

fn map_transaction_error(err: anyhow::Error) -> ClientError {
    if is_user_rejected_error(&err) {
        ClientError::TransactionRejected
    } else {
        ClientError::TransactionFailed(err.to_string())
    }
}

fn command_from_entry(id: CommandId, entry: LedgerEntry) -> Command {
    let clear_value = entry
        .is_verified
        .then(|| u8::try_from(entry.clear_value).unwrap_or(0));
    Command {
        id,
        created_at: entry.created_at,
        creator: entry.creator,
        is_verified: entry.is_verified,
        clear_value,
    }
}

struct LedgerDisclosureVerifier<'a> {
    ledger: &'a dyn LedgerContract,
    command_id: &'a CommandId,
}

#[async_trait]
impl DisclosureVerifier for LedgerDisclosureVerifier<'_> {
    async fn verify(&self, clear_values_encoded: &str, proof: &[u8]) -> Result<()> {
        let tx = self
            .ledger
            .submit_disclosure_proof(self.command_id, clear_values_encoded, proof)
            .await?;
        await_finality(tx).await
    }
}

/// Client-side command-lifecycle orchestrator.
///
/// Sequences encryption, on-chain submission, confirmation and verified
/// disclosure of integer-encoded voice commands across three independent
/// collaborators, keeping the local registry consistent with ledger state.
pub struct CommandClient {
    wallet: Arc<dyn WalletSession>,
    engine: Arc<dyn EncryptionEngine>,
    ledger: Arc<dyn LedgerContract>,
    contract_address: ContractAddress,
    gate: ReadinessGate,
    registry: CommandRegistry,
    notifier: StatusNotifier,
    inflight: Mutex<HashSet<WorkflowKind>>,
}

impl CommandClient {
    pub fn new(contract_address: ContractAddress) -> Self {
        Self::new_with_collaborators(
            contract_address,
            Arc::new(MissingWalletSession),
            Arc::new(MissingEncryptionEngine),
            Arc::new(MissingLedgerContract),
        )
    }

    pub fn new_with_collaborators(
        contract_address: ContractAddress,
        wallet: Arc<dyn WalletSession>,
        engine: Arc<dyn EncryptionEngine>,
        ledger: Arc<dyn LedgerContract>,
    ) -> Self {
        let gate = ReadinessGate::new(Arc::clone(&wallet), Arc::clone(&engine));
        Self {
            wallet,
            engine,
            ledger,
            contract_address,
            gate,
            registry: CommandRegistry::new(),
            notifier: StatusNotifier::new(),
            inflight: Mutex::new(HashSet::new()),
        }
    }

    /// Drives the readiness gate: observes wallet connectivity and starts
    /// engine initialization at most once. Initialization failures are
    /// surfaced through the notifier and returned; nothing retries silently.
    pub async fn sync_readiness(&self) -> Result<GateState, ClientError> {
        match self.gate.sync().await {
            Ok(state) => Ok(state),
            Err(err) => {
                self.notifier
                    .error("Encryption engine initialization failed")
                    .await;
                Err(err)
            }
        }
    }

    pub async fn gate_state(&self) -> GateState {
        self.gate.state().await
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.notifier.subscribe()
    }

    pub async fn status(&self) -> Option<Status> {
        self.notifier.current().await
    }

    pub async fn commands(&self) -> Arc<Vec<Command>> {
        self.registry.snapshot().await
    }

    pub async fn stats(&self) -> CommandStats {
        self.registry.stats().await
    }

    /// Encrypts `plain_value` and submits it as a new unverified command.
    ///
    /// Non-reentrant: a second submission while one is outstanding fails
    /// with [`ClientError::Busy`]. On any step failure the registry is left
    /// untouched. An outstanding submission cannot be aborted once its
    /// transaction has been dispatched.
    pub async fn submit_command(&self, plain_value: u8) -> Result<Command, ClientError> {
        if !is_valid_command_value(plain_value) {
            return Err(ClientError::InvalidCommandValue(plain_value));
        }
        if self.gate.require_ready().await.is_err() {
            self.notifier.error("Connect wallet first").await;
            return Err(ClientError::NotReady);
        }
        let Some(creator) = self.wallet.account_id() else {
            self.notifier.error("Connect wallet first").await;
            return Err(ClientError::NotReady);
        };

        self.begin_workflow(WorkflowKind::Submission).await?;
        let result = self.submit_command_inner(plain_value, creator).await;
        self.finish_workflow(WorkflowKind::Submission).await;

        if let Err(err) = &result {
            let message = match err {
                ClientError::TransactionRejected => "Transaction rejected",
                _ => "Submission failed",
            };
            self.notifier.error(message).await;
        }
        result
    }

    async fn submit_command_inner(
        &self,
        plain_value: u8,
        creator: AccountId,
    ) -> Result<Command, ClientError> {
        self.notifier.pending("Encrypting command...").await;

        let id = self.next_command_id().await;
        let encrypted = self
            .engine
            .encrypt(&self.contract_address, &creator, plain_value)
            .await
            .map_err(|err| ClientError::Encryption(err.to_string()))?;

        let request = SubmitEntryRequest {
            id: id.clone(),
            label: SUBMIT_ENTRY_LABEL.to_string(),
            ciphertext: encrypted.ciphertext,
            proof: encrypted.proof,
            extra1: 0,
            extra2: 0,
            note: SUBMIT_ENTRY_NOTE.to_string(),
        };
        let tx = self
            .ledger
            .submit_entry(request)
            .await
            .map_err(map_transaction_error)?;

        self.notifier.pending("Processing...").await;
        await_finality(tx).await.map_err(map_transaction_error)?;

        let command = Command {
            id: id.clone(),
            created_at: Utc::now().timestamp(),
            creator,
            is_verified: false,
            clear_value: None,
        };
        if !self.registry.append(command.clone()).await {
            warn!(command_id = %id, "submitted command id already present locally");
        }
        if let Err(err) = self.reload().await {
            warn!(command_id = %id, "post-submission reload failed: {err}");
        }

        info!(command_id = %id, "command submitted");
        self.notifier.success("Command encrypted!").await;
        Ok(command)
    }

    /// Drives an unverified command through proof acquisition and on-chain
    /// verification, returning its cleartext value.
    ///
    /// Idempotent once verified: repeated calls return the stored value
    /// without touching the encryption engine or submitting a transaction.
    /// A benign "already verified" race with another verifier reloads the
    /// registry and returns `Ok(None)` instead of an error.
    pub async fn disclose_command(&self, id: &CommandId) -> Result<Option<u8>, ClientError> {
        if self.gate.require_ready().await.is_err() {
            self.notifier.error("Connect wallet first").await;
            return Err(ClientError::NotReady);
        }

        self.begin_workflow(WorkflowKind::Disclosure).await?;
        let result = self.disclose_command_inner(id).await;
        self.finish_workflow(WorkflowKind::Disclosure).await;

        if let Err(err) = &result {
            let message = match err {
                ClientError::TransactionRejected => "Transaction rejected",
                _ => "Decryption failed",
            };
            self.notifier.error(message).await;
        }
        result
    }

    async fn disclose_command_inner(&self, id: &CommandId) -> Result<Option<u8>, ClientError> {
        let entry = self.ledger.get_entry(id).await.map_err(|err| {
            if is_unknown_entry_error(&err) {
                ClientError::UnknownCommand(id.clone())
            } else {
                ClientError::Disclosure(err.to_string())
            }
        })?;

        if entry.is_verified {
            let value = u8::try_from(entry.clear_value)
                .map_err(|_| ClientError::Disclosure("stored clear value out of range".into()))?;
            self.registry.mark_verified(id, value).await;
            return Ok(Some(value));
        }

        let handle = self
            .ledger
            .get_ciphertext_handle(id)
            .await
            .map_err(|err| ClientError::Disclosure(err.to_string()))?;

        self.notifier.pending("Verifying...").await;
        let verifier = LedgerDisclosureVerifier {
            ledger: self.ledger.as_ref(),
            command_id: id,
        };
        let disclosure = match self
            .engine
            .request_disclosure_proof(
                std::slice::from_ref(&handle),
                &self.contract_address,
                &verifier,
            )
            .await
        {
            Ok(disclosure) => disclosure,
            Err(err) if is_already_verified_error(&err) => {
                // Another verifier won the race; success without new data.
                info!(command_id = %id, "entry verified concurrently by another caller");
                if let Err(err) = self.reload().await {
                    warn!(command_id = %id, "reload after concurrent verification failed: {err}");
                }
                self.notifier.success("Command already verified").await;
                return Ok(None);
            }
            Err(err) if is_user_rejected_error(&err) => {
                return Err(ClientError::TransactionRejected);
            }
            Err(err) => return Err(ClientError::Disclosure(err.to_string())),
        };

        let clear_value = disclosure
            .clear_values
            .get(&handle)
            .copied()
            .ok_or_else(|| {
                ClientError::Disclosure(format!("engine returned no clear value for {handle}"))
            })?;
        let clear_value = u8::try_from(clear_value)
            .map_err(|_| ClientError::Disclosure("disclosed clear value out of range".into()))?;

        self.registry.mark_verified(id, clear_value).await;
        if let Err(err) = self.reload().await {
            warn!(command_id = %id, "post-disclosure reload failed: {err}");
        }

        info!(command_id = %id, clear_value, "command disclosed");
        self.notifier.success("Command decrypted!").await;
        Ok(Some(clear_value))
    }

    /// Replaces the local command set with one entry per ledger-known id,
    /// reconstructed from authoritative per-entry reads. A single unreadable
    /// entry is logged and skipped rather than blanking the whole list.
    pub async fn reload(&self) -> Result<(), ClientError> {
        let ids = match self.ledger.list_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                self.notifier.error("Failed to load data").await;
                return Err(ClientError::ReloadFailed(err.to_string()));
            }
        };

        let mut commands = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ledger.get_entry(&id).await {
                Ok(entry) => commands.push(command_from_entry(id, entry)),
                Err(err) => {
                    warn!(command_id = %id, "skipping unreadable ledger entry: {err}");
                }
            }
        }

        self.registry.replace(commands).await;
        Ok(())
    }

    /// Write-path probe confirming the ledger's encryption support is live.
    pub async fn check_availability(&self) -> Result<(), ClientError> {
        self.gate.require_ready().await?;

        let result = async {
            let tx = self
                .ledger
                .check_availability()
                .await
                .map_err(map_transaction_error)?;
            await_finality(tx).await.map_err(map_transaction_error)
        }
        .await;

        match &result {
            Ok(()) => self.notifier.success("FHE system available!").await,
            Err(_) => self.notifier.error("Check failed").await,
        }
        result
    }

    /// Locally unique, submitter-assigned id. Uniqueness is checked against
    /// the known registry; the ledger never assigns ids.
    async fn next_command_id(&self) -> CommandId {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let id = CommandId::new(format!("cmd-{millis}"));
            if self.registry.get(&id).await.is_none() {
                return id;
            }
            millis += 1;
        }
    }

    async fn begin_workflow(&self, kind: WorkflowKind) -> Result<(), ClientError> {
        let mut inflight = self.inflight.lock().await;
        if !inflight.insert(kind) {
            return Err(ClientError::Busy { workflow: kind });
        }
        Ok(())
    }

    async fn finish_workflow(&self, kind: WorkflowKind) {
        self.inflight.lock().await.remove(&kind);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
