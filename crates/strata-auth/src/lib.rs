//! Strata Auth - token verification and ACL checks
//!
//! The engine only consumes authorization records: tokens are minted
//! elsewhere, verified here (HMAC-SHA256 JWTs), and checked against
//! two-level ACLs — cluster-wide and per-bucket, bucket overriding
//! cluster.

pub mod acl;
pub mod token;

pub use acl::{merge_bck_acls, merge_cluster_acls, BckAcl, CluAcl};
pub use token::{decrypt_token, encrypt_token, Token, TokenList};
