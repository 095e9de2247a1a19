//! The mountpath set
//!
//! Copy-on-write: readers snapshot an `Arc<Vec<_>>` and never observe a
//! half-applied change. Path-running xactions subscribe for change
//! notifications through a single-slot signal (`tokio::sync::Notify`), so
//! back-to-back changes coalesce into one restart.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_common::{Error, Result};
use tokio::sync::Notify;

/// One labelled local filesystem root
#[derive(Debug)]
pub struct Mountpath {
    pub path: PathBuf,
    pub label: String,
    enabled: AtomicBool,
}

impl PartialEq for Mountpath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.label == other.label
            && self.enabled.load(Ordering::Relaxed) == other.enabled.load(Ordering::Relaxed)
    }
}

impl Eq for Mountpath {}

impl Mountpath {
    fn new(path: PathBuf, label: String) -> Self {
        Self {
            path,
            label,
            enabled: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl std::fmt::Display for Mountpath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mp[{}, {}]", self.label, self.path.display())
    }
}

/// Subscription handle for mountpath-change notifications; dropped
/// handles unsubscribe themselves.
pub struct PathListener {
    id: u64,
    notify: Arc<Notify>,
    set: Weak<MountpathSet>,
}

impl PathListener {
    /// Await the next (possibly coalesced) mountpath change.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Non-blocking probe used inside walk loops.
    #[must_use]
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

impl Drop for PathListener {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.listeners.lock().remove(&self.id);
        }
    }
}

/// The mutable set of mountpaths; never empty while the target is healthy.
#[derive(Debug)]
pub struct MountpathSet {
    paths: RwLock<Arc<Vec<Arc<Mountpath>>>>,
    listeners: Mutex<HashMap<u64, Arc<Notify>>>,
    next_listener: AtomicU64,
}

impl MountpathSet {
    /// Build the set from `(path, label)` pairs; paths are created if
    /// missing and must be distinct.
    pub fn new(roots: Vec<(PathBuf, String)>) -> Result<Arc<Self>> {
        if roots.is_empty() {
            return Err(Error::invalid_argument("no mountpaths configured"));
        }
        let mut paths: Vec<Arc<Mountpath>> = Vec::with_capacity(roots.len());
        for (path, label) in roots {
            if paths.iter().any(|mp| mp.path == path || mp.label == label) {
                return Err(Error::AlreadyExists(format!("mountpath {label}")));
            }
            std::fs::create_dir_all(&path)?;
            paths.push(Arc::new(Mountpath::new(path, label)));
        }
        paths.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(Arc::new(Self {
            paths: RwLock::new(Arc::new(paths)),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }))
    }

    /// Stable snapshot of every mountpath, enabled or not.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<Mountpath>>> {
        Arc::clone(&self.paths.read())
    }

    /// Snapshot of the enabled mountpaths, sorted by label.
    #[must_use]
    pub fn enabled(&self) -> Vec<Arc<Mountpath>> {
        self.snapshot()
            .iter()
            .filter(|mp| mp.is_enabled())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<Arc<Mountpath>> {
        self.snapshot().iter().find(|mp| mp.label == label).cloned()
    }

    /// The mountpath whose root contains `fqn`, if any.
    #[must_use]
    pub fn owner_of(&self, fqn: &Path) -> Option<Arc<Mountpath>> {
        self.snapshot()
            .iter()
            .find(|mp| fqn.starts_with(&mp.path))
            .cloned()
    }

    pub fn add(&self, path: PathBuf, label: String) -> Result<()> {
        std::fs::create_dir_all(&path)?;
        {
            let mut guard = self.paths.write();
            if guard.iter().any(|mp| mp.path == path || mp.label == label) {
                return Err(Error::AlreadyExists(format!("mountpath {label}")));
            }
            let mut next = (**guard).clone();
            next.push(Arc::new(Mountpath::new(path, label.clone())));
            next.sort_by(|a, b| a.label.cmp(&b.label));
            *guard = Arc::new(next);
        }
        tracing::info!(%label, "mountpath added");
        self.notify_all();
        Ok(())
    }

    /// Remove a mountpath. Removing the last enabled one is refused: the
    /// set must stay non-empty while the target is healthy.
    pub fn remove(&self, label: &str) -> Result<Arc<Mountpath>> {
        let removed = {
            let mut guard = self.paths.write();
            let idx = guard
                .iter()
                .position(|mp| mp.label == label)
                .ok_or_else(|| Error::not_found(format!("mountpath {label}")))?;
            let remaining_enabled = guard
                .iter()
                .enumerate()
                .filter(|(i, mp)| *i != idx && mp.is_enabled())
                .count();
            if remaining_enabled == 0 {
                return Err(Error::conflict(format!(
                    "cannot remove {label}: last usable mountpath"
                )));
            }
            let mut next = (**guard).clone();
            let removed = next.remove(idx);
            *guard = Arc::new(next);
            removed
        };
        tracing::warn!(%label, "mountpath removed");
        self.notify_all();
        Ok(removed)
    }

    pub fn disable(&self, label: &str) -> Result<()> {
        let mp = self
            .get(label)
            .ok_or_else(|| Error::not_found(format!("mountpath {label}")))?;
        if self.enabled().iter().filter(|m| m.label != label).count() == 0 {
            return Err(Error::conflict(format!(
                "cannot disable {label}: last usable mountpath"
            )));
        }
        if mp.enabled.swap(false, Ordering::AcqRel) {
            tracing::warn!(%label, "mountpath disabled");
            self.notify_all();
        }
        Ok(())
    }

    pub fn enable(&self, label: &str) -> Result<()> {
        let mp = self
            .get(label)
            .ok_or_else(|| Error::not_found(format!("mountpath {label}")))?;
        if !mp.enabled.swap(true, Ordering::AcqRel) {
            tracing::info!(%label, "mountpath enabled");
            self.notify_all();
        }
        Ok(())
    }

    /// Subscribe a path-running xaction to change notifications.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> PathListener {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        self.listeners.lock().insert(id, Arc::clone(&notify));
        PathListener {
            id,
            notify,
            set: Arc::downgrade(self),
        }
    }

    fn notify_all(&self) {
        // notify_one leaves one pending permit per listener, so changes
        // arriving while a runner respawns coalesce into a single restart
        for notify in self.listeners.lock().values() {
            notify.notify_one();
        }
    }
}
