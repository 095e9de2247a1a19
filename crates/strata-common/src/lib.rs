//! Strata Common - Shared types and utilities
//!
//! This crate provides the types, error definitions, configuration, and
//! checksum utilities used across all strata components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod retry;
pub mod stats;
pub mod types;

pub use checksum::{Checksum, ChecksumCalculator, ChecksumType, ChecksumVerdict};
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
