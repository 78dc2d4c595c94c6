use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{AccountId, CiphertextHandle, ContractAddress},
    protocol::{DisclosureResult, EncryptedInput},
};
use tokio::sync::Notify;

use super::*;
use crate::DisclosureVerifier;

struct StaticWallet {
    connected: bool,
}

impl WalletSession for StaticWallet {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn account_id(&self) -> Option<AccountId> {
        self.connected.then(|| AccountId::new("0xABC"))
    }
}

struct SwitchWallet {
    connected: AtomicBool,
}

impl SwitchWallet {
    fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl WalletSession for SwitchWallet {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn account_id(&self) -> Option<AccountId> {
        self.is_connected().then(|| AccountId::new("0xABC"))
    }
}

struct CountingEngine {
    init_calls: AtomicU32,
    fail_init: bool,
    release: Option<Arc<Notify>>,
}

impl CountingEngine {
    fn ok() -> Self {
        Self {
            init_calls: AtomicU32::new(0),
            fail_init: false,
            release: None,
        }
    }

    fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::ok()
        }
    }

    fn blocking(release: Arc<Notify>) -> Self {
        Self {
            release: Some(release),
            ..Self::ok()
        }
    }
}

#[async_trait]
impl EncryptionEngine for CountingEngine {
    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if self.fail_init {
            return Err(anyhow!("engine offline"));
        }
        Ok(())
    }

    async fn encrypt(
        &self,
        _contract: &ContractAddress,
        _account: &AccountId,
        _plain_value: u8,
    ) -> Result<EncryptedInput> {
        Err(anyhow!("not exercised by gate tests"))
    }

    async fn request_disclosure_proof(
        &self,
        _handles: &[CiphertextHandle],
        _contract: &ContractAddress,
        _verifier: &dyn DisclosureVerifier,
    ) -> Result<DisclosureResult> {
        Err(anyhow!("not exercised by gate tests"))
    }
}

fn gate_with(connected: bool, engine: Arc<CountingEngine>) -> ReadinessGate {
    ReadinessGate::new(Arc::new(StaticWallet { connected }), engine)
}

#[tokio::test]
async fn disconnected_wallet_keeps_gate_closed() {
    let engine = Arc::new(CountingEngine::ok());
    let gate = gate_with(false, Arc::clone(&engine));

    assert_eq!(gate.sync().await.unwrap(), GateState::Disconnected);
    assert!(matches!(
        gate.require_ready().await,
        Err(ClientError::NotReady)
    ));
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sync_initializes_once_and_reaches_ready() {
    let engine = Arc::new(CountingEngine::ok());
    let gate = gate_with(true, Arc::clone(&engine));

    assert_eq!(gate.sync().await.unwrap(), GateState::Ready);
    assert_eq!(gate.sync().await.unwrap(), GateState::Ready);
    assert!(gate.require_ready().await.is_ok());
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_syncs_share_a_single_initialization_attempt() {
    let release = Arc::new(Notify::new());
    let engine = Arc::new(CountingEngine::blocking(Arc::clone(&release)));
    let gate = Arc::new(gate_with(true, Arc::clone(&engine)));

    let first = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.sync().await }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert_eq!(gate.sync().await.unwrap(), GateState::Initializing);
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);

    release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), GateState::Ready);
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wallet_flap_does_not_start_a_second_initialization() {
    let release = Arc::new(Notify::new());
    let engine = Arc::new(CountingEngine::blocking(Arc::clone(&release)));
    let wallet = Arc::new(SwitchWallet::connected());
    let gate = Arc::new(ReadinessGate::new(
        Arc::clone(&wallet) as Arc<dyn WalletSession>,
        Arc::clone(&engine) as Arc<dyn EncryptionEngine>,
    ));

    let first = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.sync().await }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);

    // Disconnect while the attempt is still running, then reconnect. The
    // live attempt must be remembered, not restarted.
    wallet.set_connected(false);
    assert_eq!(gate.sync().await.unwrap(), GateState::Disconnected);
    wallet.set_connected(true);
    assert_eq!(gate.sync().await.unwrap(), GateState::Initializing);
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);

    release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), GateState::Ready);
    assert_eq!(gate.state().await, GateState::Ready);
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn initialization_failure_returns_to_uninitialized_without_retry() {
    let engine = Arc::new(CountingEngine::failing());
    let gate = gate_with(true, Arc::clone(&engine));

    assert!(matches!(
        gate.sync().await,
        Err(ClientError::EngineInit(_))
    ));
    assert_eq!(gate.state().await, GateState::EngineUninitialized);
    assert!(matches!(
        gate.require_ready().await,
        Err(ClientError::NotReady)
    ));
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);

    // Another explicit sync may try again; nothing retried on its own.
    let _ = gate.sync().await;
    assert_eq!(engine.init_calls.load(Ordering::SeqCst), 2);
}
