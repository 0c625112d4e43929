//! One-shot readiness barrier for a foreign module.
//!
//! `Uninitialized -> Initializing -> Ready`, with `Failed` as the terminal
//! state when initialization aborts after it began. There is no way back: a
//! second `begin` is a lifecycle error, not a reload.
//!
//! `begin` hands out an `Initialization` token, and only the token can settle
//! the gate. Dropping an unsettled token (the initializing future was
//! cancelled, or panicked) moves the gate to `Failed`, so waiters never hang
//! on an initialization nobody is driving any more.

use tokio::sync::watch;

use zbridge_core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

impl GateState {
    fn is_settled(&self) -> bool {
        matches!(self, GateState::Ready | GateState::Failed(_))
    }
}

pub struct ReadinessGate {
    tx: watch::Sender<GateState>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Uninitialized);
        Self { tx }
    }

    pub fn state(&self) -> GateState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), GateState::Ready)
    }

    /// `Uninitialized -> Initializing`.
    pub fn begin(&self) -> Result<Initialization<'_>> {
        self.transition("begin", |s| matches!(s, GateState::Uninitialized), GateState::Initializing)?;
        Ok(Initialization {
            gate: self,
            settled: false,
        })
    }

    /// Resolve once the gate settles: `Ok` on Ready, `Err` on Failed.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(GateState::is_settled)
            .await
            .map_err(|_| Error::Lifecycle("readiness gate dropped".into()))?
            .clone();
        match settled {
            GateState::Ready => Ok(()),
            GateState::Failed(reason) => Err(Error::Lifecycle(format!(
                "module initialization failed: {reason}"
            ))),
            other => Err(Error::Lifecycle(format!(
                "readiness gate woke in unsettled state {other:?}"
            ))),
        }
    }

    fn settle(&self, op: &str, next: GateState) -> Result<()> {
        self.transition(op, |s| matches!(s, GateState::Initializing), next)
    }

    fn transition(
        &self,
        op: &str,
        allowed: impl Fn(&GateState) -> bool,
        next: GateState,
    ) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|state| {
            if allowed(state) {
                tracing::debug!(from = ?state, to = ?next, "readiness gate transition");
                *state = next;
                true
            } else {
                outcome = Err(Error::Lifecycle(format!(
                    "cannot {op} from state {state:?}"
                )));
                false
            }
        });
        outcome
    }
}

/// The right to settle an `Initializing` gate.
#[must_use = "dropping an Initialization fails the gate"]
pub struct Initialization<'g> {
    gate: &'g ReadinessGate,
    settled: bool,
}

impl Initialization<'_> {
    /// `Initializing -> Ready`. Wakes every waiter.
    pub fn mark_ready(mut self) -> Result<()> {
        self.settled = true;
        self.gate.settle("mark_ready", GateState::Ready)
    }

    /// `Initializing -> Failed`. Wakes every waiter with the reason.
    pub fn mark_failed(mut self, reason: impl Into<String>) -> Result<()> {
        self.settled = true;
        self.gate.settle("mark_failed", GateState::Failed(reason.into()))
    }
}

impl Drop for Initialization<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!("module initialization abandoned before completion");
        let _ = self.gate.settle(
            "abandon",
            GateState::Failed("initialization abandoned before completion".into()),
        );
    }
}
