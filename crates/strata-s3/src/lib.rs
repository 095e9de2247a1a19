//! Strata S3 - the S3-compatibility core
//!
//! The pieces of the S3 surface the engine owns: the fast datapath-query
//! parser, the multipart-upload state machine, ListObjectsV2 pagination,
//! and the bucket-inventory CSV reader. The HTTP layer itself lives
//! outside the engine.

pub mod dpq;
pub mod inventory;
pub mod list;
pub mod mpt;

pub use dpq::Dpq;
pub use inventory::{InvCtx, InvField, InvSchema, LsoEntry, LsoMsg, LsoPage};
pub use mpt::{MptPart, MptRegistry, PartInfo, UploadInfo};
