//! Checksum utilities for strata
//!
//! Typed, per-bucket-configurable checksums with streaming calculation.
//! The checksum type travels with the value so a bucket's type can change
//! without invalidating already-persisted metadata.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Checksum algorithm; selected per bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    None,
    Crc32c,
    #[default]
    #[serde(rename = "xxhash")]
    XxHash64,
    Sha256,
    Md5,
}

impl ChecksumType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Crc32c => "crc32c",
            Self::XxHash64 => "xxhash",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed checksum: algorithm plus hex value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub ty: ChecksumType,
    pub value: String,
}

impl Checksum {
    #[must_use]
    pub fn new(ty: ChecksumType, value: impl Into<String>) -> Self {
        Self {
            ty,
            value: value.into(),
        }
    }

    /// Compute over an in-memory buffer
    #[must_use]
    pub fn compute(ty: ChecksumType, data: &[u8]) -> Self {
        let mut calc = ChecksumCalculator::new(ty);
        calc.update(data);
        calc.finalize()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ty == ChecksumType::None || self.value.is_empty()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ty, self.value)
    }
}

/// Outcome of recomputing a stored checksum against on-disk bytes
#[derive(Debug)]
pub enum ChecksumVerdict {
    Ok,
    Mismatch { expected: Checksum, got: Checksum },
    Io(std::io::Error),
}

impl ChecksumVerdict {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

enum CalcState {
    None,
    Crc32c(u32),
    XxHash64(xxhash_rust::xxh64::Xxh64),
    Sha256(Sha256),
    Md5(md5::Context),
}

/// Streaming checksum calculator
pub struct ChecksumCalculator {
    ty: ChecksumType,
    state: CalcState,
}

impl ChecksumCalculator {
    #[must_use]
    pub fn new(ty: ChecksumType) -> Self {
        let state = match ty {
            ChecksumType::None => CalcState::None,
            ChecksumType::Crc32c => CalcState::Crc32c(0),
            ChecksumType::XxHash64 => CalcState::XxHash64(xxhash_rust::xxh64::Xxh64::new(0)),
            ChecksumType::Sha256 => CalcState::Sha256(Sha256::new()),
            ChecksumType::Md5 => CalcState::Md5(md5::Context::new()),
        };
        Self { ty, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            CalcState::None => {}
            CalcState::Crc32c(crc) => *crc = crc32c::crc32c_append(*crc, data),
            CalcState::XxHash64(h) => h.update(data),
            CalcState::Sha256(h) => h.update(data),
            CalcState::Md5(h) => h.consume(data),
        }
    }

    #[must_use]
    pub fn finalize(self) -> Checksum {
        let value = match self.state {
            CalcState::None => String::new(),
            CalcState::Crc32c(crc) => format!("{crc:08x}"),
            CalcState::XxHash64(h) => format!("{:016x}", h.digest()),
            CalcState::Sha256(h) => hex_encode(&h.finalize()),
            CalcState::Md5(h) => hex_encode(&h.compute().0),
        };
        Checksum {
            ty: self.ty,
            value,
        }
    }
}

/// Hex encode bytes
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_per_type() {
        let data = b"hello, world!";
        for ty in [
            ChecksumType::Crc32c,
            ChecksumType::XxHash64,
            ChecksumType::Sha256,
            ChecksumType::Md5,
        ] {
            let cksum = Checksum::compute(ty, data);
            assert_eq!(cksum.ty, ty);
            assert!(!cksum.is_empty(), "{ty} produced empty value");
        }
        assert!(Checksum::compute(ChecksumType::None, data).is_empty());
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let expected = Checksum::compute(ChecksumType::Sha256, b"hello, world!");
        let mut calc = ChecksumCalculator::new(ChecksumType::Sha256);
        calc.update(b"hello, ");
        calc.update(b"world!");
        assert_eq!(calc.finalize(), expected);
    }

    #[test]
    fn test_corruption_detected() {
        let good = Checksum::compute(ChecksumType::XxHash64, b"payload");
        let bad = Checksum::compute(ChecksumType::XxHash64, b"paylaod");
        assert_ne!(good, bad);
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x12, 0xab, 0xcd]), "12abcd");
        assert_eq!(hex_encode(&[0x00, 0xff]), "00ff");
    }
}
