//! Single-slot abort signal between the analysis monitor and the driver.
//!
//! At most one abort is pending at a time. Raising never blocks: a raise
//! while one is already pending is dropped, since one pending abort is
//! enough to stop the driver. A pending abort is never lost; it stays in
//! the slot until the driver takes it.

use tokio::sync::mpsc;

/// Why the monitor asked for a revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The analyzer answered "do not continue".
    Rejected,
    /// The analyzer could not produce a verdict.
    AnalysisFailed(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected => f.write_str("analysis rejected the new cluster"),
            Self::AnalysisFailed(e) => write!(f, "analysis failed: {e}"),
        }
    }
}

/// Create a connected sender/receiver pair with a single slot.
pub fn abort_signal() -> (AbortSender, AbortReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (AbortSender { tx }, AbortReceiver { rx })
}

/// Producer side, held by the analysis monitor.
#[derive(Debug, Clone)]
pub struct AbortSender {
    tx: mpsc::Sender<AbortReason>,
}

impl AbortSender {
    /// Raise an abort without blocking.
    ///
    /// Returns `true` if the abort was placed in the slot, `false` if one
    /// was already pending or the driver is gone.
    pub fn raise(&self, reason: AbortReason) -> bool {
        self.tx.try_send(reason).is_ok()
    }

    /// Whether an abort is sitting in the slot, not yet taken.
    ///
    /// Advisory only: the driver may take the abort right after this
    /// returns `true`.
    pub fn is_pending(&self) -> bool {
        !self.tx.is_closed() && self.tx.capacity() == 0
    }
}

/// Consumer side, owned by the driver.
#[derive(Debug)]
pub struct AbortReceiver {
    rx: mpsc::Receiver<AbortReason>,
}

impl AbortReceiver {
    /// Wait for the next abort. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<AbortReason> {
        self.rx.recv().await
    }

    /// Take a pending abort without waiting.
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<AbortReason> {
        self.rx.try_recv().ok()
    }
}
