//! The persisted per-object metadata block
//!
//! Checksum, version, copies, custom key/values, and completed-multipart
//! part records survive as one JSON blob in a single user xattr on the
//! primary FQN. A single `setxattr` replaces the whole block atomically.
//!
//! Filesystems without user-xattr support (tmpfs and friends) fall back
//! to a sidecar file written through a temp file + rename.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use strata_common::{Checksum, Error, Result};

const XATTR_NAME: &str = "user.strata.lmeta";
const SIDECAR_SUFFIX: &str = ".lmeta";

/// A completed multipart-upload part, persisted on the final object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MptPartMeta {
    pub md5: String,
    pub size: u64,
    pub num: i64,
}

/// The serialized metadata block
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LmetaBlock {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cksum: Option<Checksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mpt_parts: Vec<MptPartMeta>,
}

fn sidecar_path(fqn: &Path) -> PathBuf {
    let mut os = fqn.as_os_str().to_owned();
    os.push(SIDECAR_SUFFIX);
    PathBuf::from(os)
}

fn xattr_unsupported(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::Unsupported || err.raw_os_error() == Some(libc::EOPNOTSUPP)
}

/// Load the metadata block of `fqn`. `Ok(None)` when no block was ever
/// persisted; `Corruption` when a present block fails to parse.
pub fn load(fqn: &Path) -> Result<Option<LmetaBlock>> {
    let raw = match xattr::get(fqn, XATTR_NAME) {
        Ok(Some(raw)) => Some(raw),
        Ok(None) => None,
        Err(e) if xattr_unsupported(&e) => None,
        Err(e) => return Err(e.into()),
    };
    let raw = match raw {
        Some(raw) => raw,
        None => {
            let sidecar = sidecar_path(fqn);
            match std::fs::read(&sidecar) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    };
    serde_json::from_slice(&raw).map(Some).map_err(|e| Error::Corruption {
        expected: "lmeta block".to_string(),
        got: format!("unparseable xattr ({e})"),
    })
}

/// Persist the metadata block of `fqn`, replacing any previous one.
pub fn store(fqn: &Path, block: &LmetaBlock) -> Result<()> {
    let raw = serde_json::to_vec(block).map_err(|e| Error::internal(e.to_string()))?;
    match xattr::set(fqn, XATTR_NAME, &raw) {
        Ok(()) => Ok(()),
        Err(e) if xattr_unsupported(&e) => store_sidecar(fqn, &raw),
        Err(e) => Err(e.into()),
    }
}

fn store_sidecar(fqn: &Path, raw: &[u8]) -> Result<()> {
    let sidecar = sidecar_path(fqn);
    let tmp = sidecar.with_extension("lmeta.tmp");
    std::fs::write(&tmp, raw)?;
    std::fs::rename(&tmp, &sidecar)?;
    Ok(())
}

/// Drop any persisted block; used when the object itself is destroyed.
pub fn remove(fqn: &Path) -> Result<()> {
    match xattr::remove(fqn, XATTR_NAME) {
        Ok(()) => {}
        Err(e)
            if e.kind() == ErrorKind::NotFound
                || e.raw_os_error() == Some(libc::ENODATA)
                || xattr_unsupported(&e) => {}
        Err(e) => return Err(e.into()),
    }
    match std::fs::remove_file(sidecar_path(fqn)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether a path is an lmeta sidecar (skipped by walkers).
#[must_use]
pub fn is_sidecar(path: &Path) -> bool {
    path.as_os_str()
        .to_str()
        .is_some_and(|s| s.ends_with(SIDECAR_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::ChecksumType;
    use tempfile::TempDir;

    #[test]
    fn test_store_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let fqn = dir.path().join("obj");
        std::fs::write(&fqn, b"payload").unwrap();

        let block = LmetaBlock {
            size: 7,
            cksum: Some(Checksum::compute(ChecksumType::XxHash64, b"payload")),
            version: Some("1".into()),
            copies: vec![PathBuf::from("/data/2/%ob/ais/b/obj")],
            ..Default::default()
        };
        store(&fqn, &block).unwrap();
        assert_eq!(load(&fqn).unwrap().unwrap(), block);
    }

    #[test]
    fn test_missing_block_is_none() {
        let dir = TempDir::new().unwrap();
        let fqn = dir.path().join("naked");
        std::fs::write(&fqn, b"x").unwrap();
        assert!(load(&fqn).unwrap().is_none());
    }

    #[test]
    fn test_remove_idempotent() {
        let dir = TempDir::new().unwrap();
        let fqn = dir.path().join("obj");
        std::fs::write(&fqn, b"x").unwrap();
        store(&fqn, &LmetaBlock::default()).unwrap();
        remove(&fqn).unwrap();
        remove(&fqn).unwrap();
        assert!(load(&fqn).unwrap().is_none());
    }

    #[test]
    fn test_mpt_parts_survive() {
        let dir = TempDir::new().unwrap();
        let fqn = dir.path().join("completed");
        std::fs::write(&fqn, b"whole object").unwrap();

        let block = LmetaBlock {
            size: 12,
            mpt_parts: vec![
                MptPartMeta {
                    md5: "a".repeat(32),
                    size: 6,
                    num: 1,
                },
                MptPartMeta {
                    md5: "b".repeat(32),
                    size: 6,
                    num: 2,
                },
            ],
            ..Default::default()
        };
        store(&fqn, &block).unwrap();
        let loaded = load(&fqn).unwrap().unwrap();
        assert_eq!(loaded.mpt_parts.len(), 2);
        assert_eq!(loaded.mpt_parts[1].num, 2);
    }
}
