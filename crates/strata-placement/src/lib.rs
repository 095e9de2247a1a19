//! Strata Placement - cluster map and HRW hashing
//!
//! Deterministic object placement via Highest Random Weight (rendezvous)
//! hashing, applied at two levels:
//!
//! 1. **Cluster level**: `hrw_target` maps an object's unique name to the
//!    one target that owns it. Adding or removing a target relocates only
//!    ~`1/N` of the keys.
//! 2. **Target level**: `hrw_mountpath` maps the same name to a stable
//!    primary mountpath, and `hrw_copies` plans mirror copies on distinct
//!    mountpaths.

pub mod hrw;
pub mod smap;

pub use hrw::{hrw_copies, hrw_mountpath_idx, hrw_named, hrw_target};
pub use smap::{Smap, SmapOwner, Snode};
