//! Strata Core - per-object metadata and locking
//!
//! The LOM (Local Object Metadata) is the in-memory record describing one
//! object on this target: identity, size, checksum, access time, copies,
//! and placement flags. LOMs are materialized lazily via `fill`, mutated
//! only under an exclusive name-lock, and persisted as an xattr block on
//! the primary FQN.

pub mod cache;
pub mod gfn;
pub mod lom;
pub mod namelock;

pub use cache::LomCache;
pub use gfn::{resolve_gfn, GfnDecision};
pub use lom::{FillFlags, Lom};
pub use namelock::{NameLockGuard, NameLocker};
