//! Strata Mirror - local replica management
//!
//! Bucket-scoped xactions that enforce `copies == N` across the enabled
//! mountpaths of this target:
//!
//! - [`XactMakeNCopies`]: walk the bucket and add copies until every
//!   primary has `N - 1` replicas (truncated when fewer mountpaths exist).
//! - [`XactEraseCopies`]: walk the bucket and delete replicas down to the
//!   configured count (zero drops all of them).
//! - [`XactPutCopies`]: the on-demand PUT-path copier; replicates single
//!   objects as they are written and self-terminates when idle.
//!
//! Every walker is a path-runner: one jogger per mountpath, all joggers
//! stopped and respawned on any mountpath add/remove/enable/disable.

mod erase;
mod jog;
mod mnc;
mod putcopies;

pub use erase::{EraseCopiesFactory, XactEraseCopies};
pub use mnc::{MakeNCopiesFactory, XactMakeNCopies};
pub use putcopies::{PutCopiesFactory, XactPutCopies};

use std::sync::Arc;
use strata_common::stats::CoreStats;
use strata_core::{LomCache, NameLocker};
use strata_fs::MountpathSet;

/// Singleton handles every mirror worker needs; passed by construction.
#[derive(Clone)]
pub struct MirrorDeps {
    pub mpaths: Arc<MountpathSet>,
    pub locker: Arc<NameLocker>,
    pub cache: Arc<LomCache>,
    pub stats: Arc<CoreStats>,
}
