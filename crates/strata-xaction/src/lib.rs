//! Strata Xaction - extended actions
//!
//! An xaction is a named, abortable, possibly long-running job: LRU
//! eviction, n-way mirroring, copy erasure, rebalance. Xactions are
//! renewed (idempotently started) through a registry that guarantees at
//! most one non-terminal instance per `(kind, bucket)` — or per kind for
//! global xactions — and reaped by a housekeeper once idle.

pub mod base;
pub mod demand;
pub mod hk;
pub mod registry;

pub use base::{Scope, Xact, XactBase, XactKind, XactSnap, XactState};
pub use demand::DemandState;
pub use hk::Housekeeper;
pub use registry::{RenewRes, XactArgs, XactCustom, XactFactory, XactFilter, XactRegistry};
