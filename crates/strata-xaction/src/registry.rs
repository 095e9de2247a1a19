//! The xaction registry
//!
//! Factories are registered at wire time and frozen before the first
//! renewal. Renewal is linearized by one coarse mutex over the entry
//! list, which enforces the uniqueness invariant: at most one
//! non-terminal xaction per `(kind, bucket)` — per kind for globals.

use crate::base::{Scope, Xact, XactKind, XactSnap};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use strata_common::{Bck, Error, Result};

/// Kind-specific renewal parameters; a closed set, no downcasting
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum XactCustom {
    #[default]
    None,
    /// Target copy count for the mirror family
    Copies(u32),
}

/// Arguments passed through `renew` to the factory
#[derive(Clone, Debug, Default)]
pub struct XactArgs {
    pub uuid: Option<String>,
    pub bck: Option<Bck>,
    pub custom: XactCustom,
}

impl XactArgs {
    #[must_use]
    pub fn for_bck(bck: Bck) -> Self {
        Self {
            bck: Some(bck),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_copies(mut self, copies: u32) -> Self {
        self.custom = XactCustom::Copies(copies);
        self
    }
}

/// Result of a renewal
#[derive(Clone)]
pub struct RenewRes {
    pub entry: Arc<dyn Xact>,
    pub is_new: bool,
}

impl std::fmt::Debug for RenewRes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewRes")
            .field("entry", &Arc::as_ptr(&self.entry))
            .field("is_new", &self.is_new)
            .finish()
    }
}

/// Per-kind constructor plus renewal hooks
pub trait XactFactory: Send + Sync {
    fn kind(&self) -> XactKind;

    /// Build a new, not-yet-started xaction.
    fn new_xact(&self, args: XactArgs) -> Result<Arc<dyn Xact>>;

    /// Inspect a running previous instance: `Ok(true)` keeps it (the
    /// renewal returns it), `Ok(false)` replaces it, `Err` refuses the
    /// renewal. The default keeps on-demand instances and replaces
    /// bounded ones.
    fn pre_renew(&self, prev: &Arc<dyn Xact>) -> Result<bool> {
        Ok(prev.as_demand().is_some())
    }

    /// Called after a replacing renewal, with the aborted predecessor.
    fn post_renew(&self, _prev: Option<&Arc<dyn Xact>>) {}
}

/// Introspection filter for `list`
#[derive(Clone, Debug, Default)]
pub struct XactFilter {
    pub kind: Option<XactKind>,
    pub bck: Option<Bck>,
    pub running_only: bool,
}

/// The registry singleton; created at startup, passed to workers by
/// construction.
pub struct XactRegistry {
    factories: Mutex<HashMap<XactKind, Arc<dyn XactFactory>>>,
    frozen: AtomicBool,
    entries: Mutex<Vec<Arc<dyn Xact>>>,
}

impl Default for XactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl XactRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
            frozen: AtomicBool::new(false),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Wire-time registration; panics after `freeze` — late registration
    /// is a programming error, not a runtime condition.
    pub fn register_factory(&self, factory: Arc<dyn XactFactory>) {
        assert!(
            !self.frozen.load(Ordering::Acquire),
            "factory registration after freeze"
        );
        let kind = factory.kind();
        let prev = self.factories.lock().insert(kind, factory);
        assert!(prev.is_none(), "duplicate factory for {kind}");
    }

    /// After this, the factory table is read-only.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn factory(&self, kind: XactKind) -> Result<Arc<dyn XactFactory>> {
        self.factories
            .lock()
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::internal(format!("no factory for {kind}")))
    }

    fn keys_match(kind: XactKind, bck: Option<&Bck>, x: &Arc<dyn Xact>) -> bool {
        if x.base().kind() != kind {
            return false;
        }
        match kind.scope() {
            Scope::Global => true,
            Scope::Bucket => x.base().bck() == bck,
        }
    }

    /// Idempotent start: returns the running instance when one exists
    /// (refreshing its idle clock if on-demand), otherwise constructs,
    /// starts, and inserts a new one. Linearized by the entries lock;
    /// failures leave the registry unchanged.
    pub fn renew(&self, kind: XactKind, args: XactArgs) -> Result<RenewRes> {
        let factory = self.factory(kind)?;
        let bck = args.bck.clone();
        let mut entries = self.entries.lock();

        let prev = entries
            .iter()
            .find(|x| !x.base().finished() && Self::keys_match(kind, bck.as_ref(), x))
            .cloned();

        if let Some(prev) = &prev {
            if factory.pre_renew(prev)? {
                if let Some(demand) = prev.as_demand() {
                    // refresh the idle clock so a concurrent sweep does
                    // not reap the instance we are about to return
                    demand.inc_pending();
                    demand.dec_pending();
                }
                return Ok(RenewRes {
                    entry: Arc::clone(prev),
                    is_new: false,
                });
            }
        }

        let entry = factory.new_xact(args)?;
        debug_assert_eq!(entry.base().kind(), kind);
        if let Some(prev) = &prev {
            prev.base().abort();
        }
        Arc::clone(&entry).start()?;
        entries.push(Arc::clone(&entry));
        factory.post_renew(prev.as_ref());
        tracing::debug!(%kind, uuid = entry.base().uuid(), "xaction renewed (new)");
        Ok(RenewRes {
            entry,
            is_new: true,
        })
    }

    /// Abort the non-terminal instance for the key, if any.
    pub fn abort(&self, kind: XactKind, bck: Option<&Bck>) -> bool {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|x| Self::keys_match(kind, bck, x))
            .fold(false, |acc, x| x.base().abort() || acc)
    }

    /// Abort everything; used on shutdown. Idempotent.
    pub fn abort_all(&self) {
        for x in self.entries.lock().iter() {
            x.base().abort();
        }
    }

    #[must_use]
    pub fn get_by_uuid(&self, uuid: &str) -> Option<Arc<dyn Xact>> {
        self.entries
            .lock()
            .iter()
            .find(|x| x.base().uuid() == uuid)
            .cloned()
    }

    #[must_use]
    pub fn list(&self, filter: &XactFilter) -> Vec<XactSnap> {
        self.entries
            .lock()
            .iter()
            .filter(|x| {
                let base = x.base();
                filter.kind.map_or(true, |k| base.kind() == k)
                    && filter
                        .bck
                        .as_ref()
                        .map_or(true, |b| base.bck() == Some(b))
                    && (!filter.running_only || !base.finished())
            })
            .map(|x| x.base().snap())
            .collect()
    }

    /// Housekeeper callback: abort on-demand xactions idle past their
    /// timeout. Returns the number aborted.
    pub fn abort_idle(&self) -> usize {
        let entries = self.entries.lock();
        let mut aborted = 0;
        for x in entries.iter() {
            if x.base().finished() {
                continue;
            }
            if let Some(demand) = x.as_demand() {
                if demand.is_idle() && x.base().abort() {
                    tracing::info!(uuid = x.base().uuid(), "idle on-demand xaction reaped");
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Housekeeper callback: drop terminal entries older than `retention`.
    pub fn gc_terminal(&self, retention: Duration) -> usize {
        let cutoff = SystemTime::now() - retention;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|x| {
            let base = x.base();
            !base.finished() || base.end_time().map_or(true, |end| end > cutoff)
        });
        before - entries.len()
    }
}
