//! Strata FS - the local filesystem layer
//!
//! A target stores objects on a mutable set of labelled *mountpaths*.
//! Each mountpath materializes one subtree per content type (objects,
//! workfiles) per bucket. This crate owns:
//!
//! - the copy-on-write mountpath set with add/remove/enable/disable and
//!   change notifications for path-running xactions,
//! - canonical path construction and FQN parsing,
//! - workfile naming and crash-safe finalize (write + rename),
//! - the serialized per-object metadata block (one user xattr),
//! - filesystem usage probes behind a trait so tests can inject capacity.

pub mod content;
pub mod diskspace;
pub mod fsutil;
pub mod lmeta;
pub mod mountpath;

pub use content::{ContentType, ParsedFqn};
pub use diskspace::{Diskspace, DuUsage, FsUsage, Statvfs};
pub use lmeta::{LmetaBlock, MptPartMeta};
pub use mountpath::{Mountpath, MountpathSet, PathListener};
