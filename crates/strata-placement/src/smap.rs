//! Cluster map
//!
//! The map is versioned and immutable once published; the owner swaps a
//! new `Arc` in and observers keep reading their snapshot. Mutation goes
//! through `SmapOwner::update`, which bumps the version.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A storage node (target) in the cluster map
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snode {
    /// Target ID, e.g. `t[xyzp8080]`
    pub id: String,
    /// Placement weight; >= 1
    pub weight: u64,
}

impl Snode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weight: 1,
        }
    }

    pub fn with_weight(id: impl Into<String>, weight: u64) -> Self {
        Self {
            id: id.into(),
            weight: weight.max(1),
        }
    }
}

impl fmt::Display for Snode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// An ordered, versioned set of targets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Smap {
    pub version: u64,
    pub targets: BTreeMap<String, Snode>,
}

impl Smap {
    #[must_use]
    pub fn new(version: u64) -> Self {
        Self {
            version,
            targets: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, node: Snode) {
        self.targets.insert(node.id.clone(), node);
    }

    pub fn remove(&mut self, id: &str) -> Option<Snode> {
        self.targets.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Snode> {
        self.targets.get(id)
    }

    #[must_use]
    pub fn count_targets(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Display for Smap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "smap-v{}({} targets)", self.version, self.targets.len())
    }
}

/// The singleton holder of the current cluster map.
///
/// Readers call `get()` for an `Arc` snapshot; there is no torn read and
/// no lock held across use.
#[derive(Debug)]
pub struct SmapOwner {
    smap: RwLock<Arc<Smap>>,
}

impl SmapOwner {
    #[must_use]
    pub fn new(initial: Smap) -> Self {
        Self {
            smap: RwLock::new(Arc::new(initial)),
        }
    }

    #[must_use]
    pub fn get(&self) -> Arc<Smap> {
        Arc::clone(&self.smap.read())
    }

    /// Publish a new map; the version must advance.
    pub fn update(&self, next: Smap) -> Result<(), String> {
        let mut guard = self.smap.write();
        if next.version <= guard.version {
            return Err(format!(
                "stale cluster map v{} (current v{})",
                next.version, guard.version
            ));
        }
        tracing::info!(old = guard.version, new = next.version, "cluster map updated");
        *guard = Arc::new(next);
        Ok(())
    }
}
