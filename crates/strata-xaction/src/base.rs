//! Xaction identity, states, and the abort channel
//!
//! States form `Running -> (Aborted | Finished)`; terminal states are
//! absorbing. Abort is idempotent and completes in bounded time: it flips
//! the state and wakes every waiter; workers observe it at their next
//! yield point.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::SystemTime;
use strata_common::{Bck, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// The closed set of xaction kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XactKind {
    Lru,
    MakeNCopies,
    EraseCopies,
    PutCopies,
    EcEncode,
    Rebalance,
    Prefetch,
    EvictRange,
    MoveBck,
    Summary,
}

/// Whether a kind is keyed by bucket or cluster-wide
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Bucket,
    Global,
}

impl XactKind {
    #[must_use]
    pub const fn scope(&self) -> Scope {
        match self {
            Self::Lru | Self::Rebalance => Scope::Global,
            _ => Scope::Bucket,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::MakeNCopies => "make-n-copies",
            Self::EraseCopies => "erase-copies",
            Self::PutCopies => "put-copies",
            Self::EcEncode => "ec-encode",
            Self::Rebalance => "rebalance",
            Self::Prefetch => "prefetch",
            Self::EvictRange => "evict-range",
            Self::MoveBck => "move-bucket",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for XactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state; terminals are absorbing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum XactState {
    Running = 0,
    Aborted = 1,
    Finished = 2,
}

impl XactState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Aborted,
            _ => Self::Finished,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        *self != Self::Running
    }
}

/// Shared identity and lifecycle of every xaction
pub struct XactBase {
    uuid: String,
    kind: XactKind,
    bck: Option<Bck>,
    start_time: SystemTime,
    end_time: Mutex<Option<SystemTime>>,
    state: AtomicU8,
    abort_notify: Notify,
}

impl XactBase {
    #[must_use]
    pub fn new(kind: XactKind, bck: Option<Bck>, uuid: Option<String>) -> Self {
        Self {
            uuid: uuid.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            kind,
            bck,
            start_time: SystemTime::now(),
            end_time: Mutex::new(None),
            state: AtomicU8::new(XactState::Running as u8),
            abort_notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn kind(&self) -> XactKind {
        self.kind
    }

    #[must_use]
    pub fn bck(&self) -> Option<&Bck> {
        self.bck.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> XactState {
        XactState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn aborted(&self) -> bool {
        self.state() == XactState::Aborted
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Signal abort. Idempotent; the first call wins the transition and
    /// wakes every waiter. Aborting a finished xaction is a no-op.
    pub fn abort(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                XactState::Running as u8,
                XactState::Aborted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            *self.end_time.lock() = Some(SystemTime::now());
            tracing::info!(uuid = %self.uuid, kind = %self.kind, "xaction aborted");
        }
        // waiters may have parked between the CAS and now
        self.abort_notify.notify_waiters();
        transitioned
    }

    /// Mark finished; loses against an earlier abort.
    pub fn finish(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                XactState::Running as u8,
                XactState::Finished as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            *self.end_time.lock() = Some(SystemTime::now());
            tracing::info!(uuid = %self.uuid, kind = %self.kind, "xaction finished");
        }
        transitioned
    }

    /// Await abort; usable inside `select!` control loops.
    pub async fn wait_aborted(&self) {
        loop {
            if self.aborted() {
                return;
            }
            let notified = self.abort_notify.notified();
            if self.aborted() {
                return;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn end_time(&self) -> Option<SystemTime> {
        *self.end_time.lock()
    }

    #[must_use]
    pub fn snap(&self) -> XactSnap {
        XactSnap {
            uuid: self.uuid.clone(),
            kind: self.kind,
            bck: self.bck.clone(),
            state: self.state(),
            start_time: self.start_time,
            end_time: self.end_time(),
        }
    }
}

impl std::fmt::Display for XactBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.bck {
            Some(bck) => write!(f, "x-{}[{}]-{}", self.kind, self.uuid, bck),
            None => write!(f, "x-{}[{}]", self.kind, self.uuid),
        }
    }
}

/// Point-in-time view for introspection
#[derive(Clone, Debug)]
pub struct XactSnap {
    pub uuid: String,
    pub kind: XactKind,
    pub bck: Option<Bck>,
    pub state: XactState,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
}

/// The xaction contract implemented by every worker
pub trait Xact: Send + Sync + 'static {
    fn base(&self) -> &XactBase;

    /// Spawn the run loop. Called exactly once, by the registry, under
    /// the registry lock.
    fn start(self: Arc<Self>) -> Result<()>;

    /// On-demand xactions expose their pending/idle state here.
    fn as_demand(&self) -> Option<&crate::demand::DemandState> {
        None
    }

    /// Concrete-type access for callers that drive a specific worker
    /// (e.g. the PUT path enqueueing into put-copies).
    fn as_any(&self) -> &dyn std::any::Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_idempotent() {
        let base = XactBase::new(XactKind::Lru, None, None);
        assert!(base.abort());
        assert!(!base.abort());
        assert_eq!(base.state(), XactState::Aborted);
        assert!(base.end_time().is_some());
    }

    #[test]
    fn test_terminals_absorbing() {
        let base = XactBase::new(XactKind::MakeNCopies, None, None);
        assert!(base.finish());
        assert!(!base.abort());
        assert_eq!(base.state(), XactState::Finished);

        let base = XactBase::new(XactKind::MakeNCopies, None, None);
        assert!(base.abort());
        assert!(!base.finish());
        assert_eq!(base.state(), XactState::Aborted);
    }

    #[tokio::test]
    async fn test_wait_aborted_wakes() {
        let base = Arc::new(XactBase::new(XactKind::EraseCopies, None, None));
        let waiter = {
            let base = Arc::clone(&base);
            tokio::spawn(async move { base.wait_aborted().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        base.abort();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_aborted never woke")
            .unwrap();
    }

    #[test]
    fn test_scope_table() {
        assert_eq!(XactKind::Lru.scope(), Scope::Global);
        assert_eq!(XactKind::Rebalance.scope(), Scope::Global);
        assert_eq!(XactKind::MakeNCopies.scope(), Scope::Bucket);
        assert_eq!(XactKind::EraseCopies.scope(), Scope::Bucket);
    }
}
