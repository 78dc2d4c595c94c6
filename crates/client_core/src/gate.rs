use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::{error::ClientError, EncryptionEngine, WalletSession};

/// Session/readiness state. Both workflows require `Ready`; anything else
/// fails fast instead of attempting partial work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Disconnected,
    EngineUninitialized,
    Initializing,
    Ready,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::Disconnected => "disconnected",
            GateState::EngineUninitialized => "engine_uninitialized",
            GateState::Initializing => "initializing",
            GateState::Ready => "ready",
        };
        f.write_str(name)
    }
}

struct GateInner {
    state: GateState,
    /// Set while an `initialize()` call is outstanding. Tracked apart from
    /// `state` so a disconnect observation cannot forget a live attempt;
    /// only the completing attempt clears it.
    init_in_flight: bool,
}

pub struct ReadinessGate {
    wallet: Arc<dyn WalletSession>,
    engine: Arc<dyn EncryptionEngine>,
    inner: Mutex<GateInner>,
}

impl ReadinessGate {
    pub fn new(wallet: Arc<dyn WalletSession>, engine: Arc<dyn EncryptionEngine>) -> Self {
        Self {
            wallet,
            engine,
            inner: Mutex::new(GateInner {
                state: GateState::Disconnected,
                init_in_flight: false,
            }),
        }
    }

    pub async fn state(&self) -> GateState {
        self.inner.lock().await.state
    }

    pub async fn require_ready(&self) -> Result<(), ClientError> {
        match self.inner.lock().await.state {
            GateState::Ready => Ok(()),
            _ => Err(ClientError::NotReady),
        }
    }

    /// Observes the wallet and, once connected, drives engine initialization
    /// exactly once. Re-entrant calls while an initialization attempt is
    /// outstanding return `Initializing` without starting a second attempt,
    /// including across a disconnect/reconnect flap while the attempt is
    /// still running. An initialization failure returns the gate to
    /// `EngineUninitialized` and is reported to the caller; there is no
    /// silent retry.
    pub async fn sync(&self) -> Result<GateState, ClientError> {
        {
            let mut inner = self.inner.lock().await;
            if !self.wallet.is_connected() {
                inner.state = GateState::Disconnected;
                return Ok(GateState::Disconnected);
            }
            match inner.state {
                GateState::Ready => return Ok(GateState::Ready),
                GateState::Initializing => return Ok(GateState::Initializing),
                GateState::Disconnected | GateState::EngineUninitialized => {
                    inner.state = GateState::Initializing;
                    if inner.init_in_flight {
                        return Ok(GateState::Initializing);
                    }
                    inner.init_in_flight = true;
                }
            }
        }

        match self.engine.initialize().await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.init_in_flight = false;
                if inner.state == GateState::Initializing {
                    inner.state = GateState::Ready;
                }
                let reached = inner.state;
                info!(gate_state = %reached, "encryption engine initialized");
                Ok(reached)
            }
            Err(err) => {
                let mut inner = self.inner.lock().await;
                inner.init_in_flight = false;
                if inner.state == GateState::Initializing {
                    inner.state = GateState::EngineUninitialized;
                }
                Err(ClientError::EngineInit(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
