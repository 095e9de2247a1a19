//! Multipart-upload tracker
//!
//! Active uploads live in memory keyed by the caller-supplied opaque
//! upload ID. Parts arrive in any order and reference workfiles; on
//! completion only `{md5, size, num}` per part survive, persisted into
//! the final object's xattr block, and every part workfile is unlinked.
//! A coarse read/write lock guards the registry; workfile I/O happens
//! outside of it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use strata_common::{Bck, Error, Result};
use strata_fs::lmeta::{self, MptPartMeta};

/// The highest part number S3 accepts
pub const MAX_PARTS_PER_UPLOAD: i64 = 10_000;

/// One uploaded part of an active upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MptPart {
    /// MD5 of the part payload (its ETag)
    pub md5: String,
    /// Workfile holding the part bytes
    pub fqn: PathBuf,
    pub size: u64,
    pub num: i64,
}

#[derive(Clone, Debug)]
struct Mpt {
    bck: Bck,
    obj_name: String,
    parts: Vec<MptPart>,
    ctime: SystemTime,
}

impl Mpt {
    fn get_part(&self, num: i64) -> Option<&MptPart> {
        self.parts.iter().find(|p| p.num == num)
    }
}

/// Part info returned to listing callers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartInfo {
    pub etag: String,
    pub part_number: i64,
    pub size: u64,
}

/// Active-upload info returned by `list_uploads`
#[derive(Clone, Debug)]
pub struct UploadInfo {
    pub key: String,
    pub upload_id: String,
    pub initiated: SystemTime,
}

/// The multipart registry singleton
#[derive(Default)]
pub struct MptRegistry {
    uploads: RwLock<HashMap<String, Mpt>>,
}

impl MptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a multipart upload. `id` is opaque; uniqueness is the
    /// caller's responsibility (typically a UUID).
    pub fn init_upload(&self, id: &str, bck: Bck, obj_name: &str) {
        let mut uploads = self.uploads.write();
        uploads.insert(
            id.to_string(),
            Mpt {
                bck,
                obj_name: obj_name.to_string(),
                parts: Vec::with_capacity(8),
                ctime: SystemTime::now(),
            },
        );
    }

    /// Add a part to an active upload; parts may arrive out of order.
    pub fn add_part(&self, id: &str, part: MptPart) -> Result<()> {
        let mut uploads = self.uploads.write();
        let upload = uploads
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("upload {id:?} ({}, {})", part.fqn.display(), part.num)))?;
        upload.parts.retain(|p| p.num != part.num); // re-upload replaces
        upload.parts.push(part);
        Ok(())
    }

    /// Verify every requested part number exists and return the parts in
    /// the caller-specified order.
    pub fn check_parts(&self, id: &str, part_nums: &[i64]) -> Result<Vec<MptPart>> {
        let uploads = self.uploads.read();
        let upload = uploads
            .get(id)
            .ok_or_else(|| Error::not_found(format!("upload {id:?}")))?;
        let mut prev = -1i64;
        for &num in part_nums {
            debug_assert!(num > prev, "part numbers must ascend");
            prev = num;
            if upload.get_part(num).is_none() {
                return Err(Error::not_found(format!("upload {id:?}: part {num}")));
            }
        }
        Ok(part_nums
            .iter()
            .map(|num| upload.get_part(*num).expect("checked above").clone())
            .collect())
    }

    /// Sum of part sizes; the final object size on completion.
    pub fn obj_size(&self, id: &str) -> Result<u64> {
        let uploads = self.uploads.read();
        let upload = uploads
            .get(id)
            .ok_or_else(|| Error::not_found(format!("upload {id:?}")))?;
        Ok(upload.parts.iter().map(|p| p.size).sum())
    }

    /// Complete or abort the upload: persist part metadata into the
    /// final FQN's xattr block (unless aborted), unlink every part
    /// workfile, and drop the upload. A missing upload is only an error
    /// for a non-aborted finish.
    pub fn finish_upload(&self, id: &str, final_fqn: &Path, aborted: bool) -> Result<()> {
        let upload = {
            let mut uploads = self.uploads.write();
            match uploads.remove(id) {
                Some(upload) => upload,
                None if aborted => return Ok(()),
                None => return Err(Error::not_found(format!("upload {id:?}"))),
            }
        };
        // registry lock released; workfile and xattr I/O below
        if !aborted {
            let mut block = lmeta::load(final_fqn)?.unwrap_or_default();
            block.mpt_parts = upload
                .parts
                .iter()
                .map(|p| MptPartMeta {
                    md5: p.md5.clone(),
                    size: p.size,
                    num: p.num,
                })
                .collect();
            block.mpt_parts.sort_by_key(|p| p.num);
            lmeta::store(final_fqn, &block)?;
        }
        for part in &upload.parts {
            match std::fs::remove_file(&part.fqn) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(fqn = %part.fqn.display(), error = %e, "part workfile unlink failed")
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn upload_exists(&self, id: &str) -> bool {
        self.uploads.read().contains_key(id)
    }

    /// Active uploads of one bucket, sorted by initiation time, with
    /// marker/max pagination (marker is an upload ID).
    #[must_use]
    pub fn list_uploads(&self, bck_name: &str, id_marker: &str, max_uploads: usize) -> (Vec<UploadInfo>, bool) {
        let mut results: Vec<UploadInfo> = {
            let uploads = self.uploads.read();
            uploads
                .iter()
                .filter(|(_, mpt)| mpt.bck.name == bck_name)
                .map(|(id, mpt)| UploadInfo {
                    key: mpt.obj_name.clone(),
                    upload_id: id.clone(),
                    initiated: mpt.ctime,
                })
                .collect()
        };
        results.sort_by(|a, b| a.initiated.cmp(&b.initiated).then(a.upload_id.cmp(&b.upload_id)));

        if !id_marker.is_empty() {
            if let Some(pos) = results.iter().position(|r| r.upload_id == id_marker) {
                results.drain(..=pos);
            }
        }
        let truncated = max_uploads > 0 && results.len() > max_uploads;
        if truncated {
            results.truncate(max_uploads);
        }
        (results, truncated)
    }

    /// Parts of an active upload, ascending by part number. For an
    /// already-completed object, falls back to the xattr block of
    /// `final_fqn`.
    pub fn list_parts(&self, id: &str, final_fqn: Option<&Path>) -> Result<Vec<PartInfo>> {
        {
            let uploads = self.uploads.read();
            if let Some(upload) = uploads.get(id) {
                let mut parts: Vec<PartInfo> = upload
                    .parts
                    .iter()
                    .map(|p| PartInfo {
                        etag: p.md5.clone(),
                        part_number: p.num,
                        size: p.size,
                    })
                    .collect();
                parts.sort_by_key(|p| p.part_number);
                return Ok(parts);
            }
        }
        let fqn = final_fqn.ok_or_else(|| Error::not_found(format!("upload {id:?}")))?;
        let block = lmeta::load(fqn)?.ok_or_else(|| Error::not_found(format!("upload {id:?}")))?;
        Ok(block
            .mpt_parts
            .iter()
            .map(|p| PartInfo {
                etag: p.md5.clone(),
                part_number: p.num,
                size: p.size,
            })
            .collect())
    }
}

/// Parse and range-check an S3 part number.
pub fn parse_part_num(s: &str) -> Result<i64> {
    match s.parse::<i64>() {
        Ok(num) if (1..=MAX_PARTS_PER_UPLOAD).contains(&num) => Ok(num),
        _ => Err(Error::invalid_argument(format!(
            "invalid part number {s:?} (must be in 1-{MAX_PARTS_PER_UPLOAD} range)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::Provider;
    use tempfile::TempDir;

    fn part(dir: &TempDir, num: i64, size: usize) -> MptPart {
        let fqn = dir.path().join(format!("part-{num}.wrk"));
        let payload = vec![num as u8; size];
        std::fs::write(&fqn, &payload).unwrap();
        MptPart {
            md5: format!("{:x}", md5::compute(&payload)),
            fqn,
            size: size as u64,
            num,
        }
    }

    fn bck() -> Bck {
        Bck::new("uploads", Provider::Ais)
    }

    #[test]
    fn test_add_then_list_sorted() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        reg.init_upload("u1", bck(), "obj");
        reg.add_part("u1", part(&dir, 3, 10)).unwrap();
        reg.add_part("u1", part(&dir, 1, 10)).unwrap();
        reg.add_part("u1", part(&dir, 2, 10)).unwrap();

        let parts = reg.list_parts("u1", None).unwrap();
        let nums: Vec<i64> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[test]
    fn test_add_part_unknown_upload() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        let err = reg.add_part("nope", part(&dir, 1, 4)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_check_parts_order_and_presence() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        reg.init_upload("u1", bck(), "obj");
        reg.add_part("u1", part(&dir, 2, 5)).unwrap();
        reg.add_part("u1", part(&dir, 5, 5)).unwrap();

        let checked = reg.check_parts("u1", &[2, 5]).unwrap();
        assert_eq!(checked[0].num, 2);
        assert_eq!(checked[1].num, 5);
        assert!(reg.check_parts("u1", &[2, 3]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_obj_size_is_part_sum() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        reg.init_upload("u1", bck(), "obj");
        reg.add_part("u1", part(&dir, 1, 100)).unwrap();
        reg.add_part("u1", part(&dir, 2, 23)).unwrap();
        assert_eq!(reg.obj_size("u1").unwrap(), 123);
    }

    #[test]
    fn test_finish_aborted_removes_workfiles_and_entry() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        reg.init_upload("u1", bck(), "obj");
        let p1 = part(&dir, 1, 5 * 1024);
        let p3 = part(&dir, 3, 5 * 1024);
        let (f1, f3) = (p1.fqn.clone(), p3.fqn.clone());
        reg.add_part("u1", p1).unwrap();
        reg.add_part("u1", p3).unwrap();

        reg.finish_upload("u1", Path::new("/nonexistent"), true).unwrap();
        assert!(!reg.upload_exists("u1"));
        assert!(!f1.exists());
        assert!(!f3.exists());

        // missing upload on aborted finish is not an error; on a real
        // completion it is
        reg.finish_upload("u1", Path::new("/nonexistent"), true).unwrap();
        assert!(reg
            .finish_upload("u1", Path::new("/nonexistent"), false)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_finish_persists_part_meta() {
        let dir = TempDir::new().unwrap();
        let reg = MptRegistry::new();
        reg.init_upload("u1", bck(), "obj");
        let p2 = part(&dir, 2, 7);
        let p1 = part(&dir, 1, 9);
        reg.add_part("u1", p2.clone()).unwrap();
        reg.add_part("u1", p1.clone()).unwrap();

        let final_fqn = dir.path().join("obj");
        std::fs::write(&final_fqn, b"assembled object").unwrap();
        reg.finish_upload("u1", &final_fqn, false).unwrap();

        assert!(!reg.upload_exists("u1"));
        assert!(!p1.fqn.exists() && !p2.fqn.exists());

        // completed parts readable via the xattr fallback, ascending
        let parts = reg.list_parts("u1", Some(&final_fqn)).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].size, 9);
        assert_eq!(parts[1].etag, p2.md5);
    }

    #[test]
    fn test_list_uploads_pagination() {
        let reg = MptRegistry::new();
        for i in 0..5 {
            reg.init_upload(&format!("u{i}"), bck(), &format!("obj{i}"));
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        reg.init_upload("other", Bck::new("elsewhere", Provider::Ais), "x");

        let (page1, truncated) = reg.list_uploads("uploads", "", 2);
        assert_eq!(page1.len(), 2);
        assert!(truncated);

        let (page2, _) = reg.list_uploads("uploads", &page1[1].upload_id, 10);
        assert_eq!(page2.len(), 3);
        assert!(page1.iter().all(|u| !page2.iter().any(|v| v.upload_id == u.upload_id)));
    }

    #[test]
    fn test_parse_part_num() {
        assert_eq!(parse_part_num("7").unwrap(), 7);
        assert!(parse_part_num("0").is_err());
        assert!(parse_part_num("10001").is_err());
        assert!(parse_part_num("banana").is_err());
    }
}
