//! LOM - Local Object Metadata
//!
//! One LOM describes one object on this target: where its primary FQN
//! lives, how big it is, its checksum/version, and which mountpaths hold
//! copies. LOMs are created lazily on first touch, filled from the
//! filesystem and the xattr block, and mutated only by the holder of an
//! exclusive name-lock on the object's unique name.

use crate::cache::LomCache;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_common::{Bck, Checksum, ChecksumCalculator, ChecksumType, ChecksumVerdict, Error, Result};
use strata_fs::content::{self, ContentType, ParsedFqn};
use strata_fs::mountpath::{Mountpath, MountpathSet};
use strata_fs::{fsutil, lmeta, LmetaBlock};
use strata_placement::hrw_mountpath_idx;

/// Additive fill selectors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillFlags(u8);

impl FillFlags {
    pub const STAT: Self = Self(1 << 0);
    pub const ATIME: Self = Self(1 << 1);
    pub const CHECKSUM: Self = Self(1 << 2);
    pub const VERSION: Self = Self(1 << 3);
    pub const COPIES: Self = Self(1 << 4);

    pub const ALL: Self =
        Self(Self::STAT.0 | Self::ATIME.0 | Self::CHECKSUM.0 | Self::VERSION.0 | Self::COPIES.0);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn has(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn wants_lmeta(self) -> bool {
        self.has(Self::CHECKSUM) || self.has(Self::VERSION) || self.has(Self::COPIES)
    }
}

/// Local Object Metadata
#[derive(Clone, Debug)]
pub struct Lom {
    pub bck: Bck,
    pub obj_name: String,
    pub fqn: PathBuf,
    pub mpath: Arc<Mountpath>,

    pub size: u64,
    pub atime_ns: i64,
    pub version: Option<String>,
    pub cksum: Option<Checksum>,
    /// FQNs of same-content copies on other mountpaths of this target
    pub copies: Vec<PathBuf>,

    pub does_not_exist: bool,
    /// Where the object's primary belongs per HRW over enabled mountpaths
    hrw_fqn: PathBuf,
    cluster_misplaced: bool,
}

impl Lom {
    /// LOM at the object's home location: the HRW mountpath for its
    /// unique name over the enabled set.
    pub fn init(bck: Bck, obj_name: impl Into<String>, mpaths: &MountpathSet) -> Result<Self> {
        let obj_name = obj_name.into();
        let enabled = mpaths.enabled();
        let mpath = Self::hrw_mountpath(&enabled, &bck.uname(&obj_name))?;
        let fqn = content::make_path_obj(&mpath, ContentType::Object, &bck, &obj_name);
        Ok(Self {
            bck,
            obj_name,
            hrw_fqn: fqn.clone(),
            fqn,
            mpath,
            size: 0,
            atime_ns: 0,
            version: None,
            cksum: None,
            copies: Vec::new(),
            does_not_exist: false,
            cluster_misplaced: false,
        })
    }

    /// LOM for an FQN discovered during a walk; marks it misplaced when
    /// its mountpath is not the HRW winner for the name.
    pub fn from_fqn(parsed: ParsedFqn, mpaths: &MountpathSet) -> Result<Self> {
        let uname = parsed.bck.uname(&parsed.obj_name);
        let enabled = mpaths.enabled();
        let home = Self::hrw_mountpath(&enabled, &uname)?;
        let hrw_fqn =
            content::make_path_obj(&home, ContentType::Object, &parsed.bck, &parsed.obj_name);
        let fqn = content::make_path_obj(&parsed.mpath, ContentType::Object, &parsed.bck, &parsed.obj_name);
        Ok(Self {
            bck: parsed.bck,
            obj_name: parsed.obj_name,
            fqn,
            hrw_fqn,
            mpath: parsed.mpath,
            size: 0,
            atime_ns: 0,
            version: None,
            cksum: None,
            copies: Vec::new(),
            does_not_exist: false,
            cluster_misplaced: false,
        })
    }

    fn hrw_mountpath(enabled: &[Arc<Mountpath>], uname: &str) -> Result<Arc<Mountpath>> {
        let labels: Vec<&str> = enabled.iter().map(|mp| mp.label.as_str()).collect();
        let idx = hrw_mountpath_idx(&labels, uname)
            .ok_or_else(|| Error::internal("no enabled mountpaths"))?;
        Ok(Arc::clone(&enabled[idx]))
    }

    #[must_use]
    pub fn uname(&self) -> String {
        self.bck.uname(&self.obj_name)
    }

    /// Whether this FQN is the object's primary location.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.fqn == self.hrw_fqn
    }

    /// A non-primary FQN registered in the replica set. Meaningful only
    /// after a `COPIES` fill.
    #[must_use]
    pub fn is_copy(&self) -> bool {
        !self.is_primary() && self.copies.contains(&self.hrw_fqn)
    }

    /// Present on this target but not where HRW says it belongs; the
    /// rebalancer will migrate it. Registered copies are not misplaced.
    #[must_use]
    pub fn is_misplaced(&self) -> bool {
        self.cluster_misplaced || (!self.is_primary() && !self.is_copy())
    }

    /// Cluster-level misplacement is decided above the LOM (HRW over the
    /// cluster map); GFN and the rebalancer mark it here.
    pub fn set_misplaced(&mut self) {
        self.cluster_misplaced = true;
    }

    #[must_use]
    pub fn has_copy(&self) -> bool {
        !self.copies.is_empty()
    }

    /// Single entry point to materialize the record. Flags are additive;
    /// a missing file sets `does_not_exist` without failing.
    pub fn fill(&mut self, flags: FillFlags, cache: Option<&LomCache>) -> Result<()> {
        if flags.has(FillFlags::STAT) || flags.has(FillFlags::ATIME) {
            match std::fs::metadata(&self.fqn) {
                Ok(meta) => {
                    self.does_not_exist = false;
                    if flags.has(FillFlags::STAT) {
                        self.size = meta.len();
                    }
                    if flags.has(FillFlags::ATIME) {
                        self.atime_ns = fsutil::atime_ns(&meta);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.does_not_exist = true;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        if flags.wants_lmeta() {
            let uname = self.uname();
            // the cache is keyed by uname, which copies share with their
            // primary; only the primary FQN may use it
            let cache = cache.filter(|_| self.is_primary());
            let block = match cache.and_then(|c| c.get(&uname)) {
                Some(cached) => Some((*cached).clone()),
                None => {
                    let loaded = lmeta::load(&self.fqn)?;
                    if let (Some(cache), Some(block)) = (cache, loaded.as_ref()) {
                        cache.put(&uname, block.clone());
                    }
                    loaded
                }
            };
            if let Some(block) = block {
                if flags.has(FillFlags::CHECKSUM) {
                    self.cksum = block.cksum.clone();
                }
                if flags.has(FillFlags::VERSION) {
                    self.version = block.version.clone();
                }
                if flags.has(FillFlags::COPIES) {
                    self.copies = block.copies.clone();
                    // a replica never lists itself; guards against stale
                    // cache entries after a mountpath change
                    self.copies.retain(|c| c != &self.fqn);
                }
            }
        }
        Ok(())
    }

    fn to_block(&self) -> LmetaBlock {
        LmetaBlock {
            size: self.size,
            cksum: self.cksum.clone(),
            version: self.version.clone(),
            copies: self.copies.clone(),
            ..Default::default()
        }
    }

    /// Persist checksum/version/copies to the primary's xattr block and
    /// refresh the cache. Callers hold the exclusive name-lock.
    pub fn persist(&self, cache: Option<&LomCache>) -> Result<()> {
        let block = self.to_block();
        lmeta::store(&self.fqn, &block)?;
        if let Some(cache) = cache.filter(|_| self.is_primary()) {
            cache.put(&self.uname(), block);
        }
        Ok(())
    }

    /// Recompute the stored checksum against on-disk bytes.
    #[must_use]
    pub fn recompute_checksum(&self) -> ChecksumVerdict {
        let expected = match &self.cksum {
            Some(cksum) if !cksum.is_empty() => cksum.clone(),
            _ => return ChecksumVerdict::Ok,
        };
        let mut file = match std::fs::File::open(&self.fqn) {
            Ok(f) => f,
            Err(e) => return ChecksumVerdict::Io(e),
        };
        let mut calc = ChecksumCalculator::new(expected.ty);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => calc.update(&buf[..n]),
                Err(e) => return ChecksumVerdict::Io(e),
            }
        }
        let got = calc.finalize();
        if got == expected {
            ChecksumVerdict::Ok
        } else {
            ChecksumVerdict::Mismatch { expected, got }
        }
    }

    /// Compute and set the checksum of the current payload.
    pub fn compute_checksum(&mut self, ty: ChecksumType) -> Result<()> {
        let mut file = std::fs::File::open(&self.fqn)?;
        let mut calc = ChecksumCalculator::new(ty);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            calc.update(&buf[..n]);
        }
        self.cksum = Some(calc.finalize());
        Ok(())
    }

    /// Replicate the primary onto `dst`; both endpoints' xattr blocks end
    /// up referencing each other. Caller holds the exclusive name-lock.
    pub fn add_copy(&mut self, dst: &Arc<Mountpath>, cache: Option<&LomCache>) -> Result<PathBuf> {
        let dst_fqn = content::make_path_obj(dst, ContentType::Object, &self.bck, &self.obj_name);
        if dst_fqn == self.fqn {
            return Err(Error::invalid_argument("copy would land on the primary"));
        }
        if self.copies.contains(&dst_fqn) {
            return Ok(dst_fqn);
        }
        let work = content::gen_workfile_fqn(dst, &self.bck, &self.obj_name);
        if let Some(parent) = work.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.fqn, &work)?;
        content::finalize_workfile(&work, &dst_fqn)?;

        self.copies.push(dst_fqn.clone());
        self.persist_replicas()?;
        self.persist(cache)?;
        Ok(dst_fqn)
    }

    /// Rewrite every copy's block so all replicas reference each other;
    /// called whenever the replica set changes.
    fn persist_replicas(&self) -> Result<()> {
        for copy_fqn in &self.copies {
            let mut block = self.to_block();
            block.copies = std::iter::once(self.fqn.clone())
                .chain(self.copies.iter().filter(|c| *c != copy_fqn).cloned())
                .collect();
            lmeta::store(copy_fqn, &block)?;
        }
        Ok(())
    }

    /// Unlink one copy and update the primary's copies list. Caller holds
    /// the exclusive name-lock.
    pub fn del_copy(&mut self, copy_fqn: &Path, cache: Option<&LomCache>) -> Result<()> {
        let idx = self
            .copies
            .iter()
            .position(|c| c == copy_fqn)
            .ok_or_else(|| Error::not_found(format!("copy {}", copy_fqn.display())))?;
        lmeta::remove(copy_fqn)?;
        match std::fs::remove_file(copy_fqn) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.copies.remove(idx);
        self.persist_replicas()?;
        self.persist(cache)
    }

    /// Unlink every copy, keeping the primary.
    pub fn del_all_copies(&mut self, cache: Option<&LomCache>) -> Result<()> {
        while let Some(copy_fqn) = self.copies.last().cloned() {
            self.del_copy(&copy_fqn, cache)?;
        }
        Ok(())
    }

    /// Unlink the primary, all copies, and all metadata. Consumes the LOM.
    pub fn destroy(mut self, cache: Option<&LomCache>) -> Result<()> {
        let uname = self.uname();
        for copy_fqn in std::mem::take(&mut self.copies) {
            lmeta::remove(&copy_fqn).ok();
            let _ = std::fs::remove_file(&copy_fqn);
        }
        lmeta::remove(&self.fqn)?;
        match std::fs::remove_file(&self.fqn) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(cache) = cache {
            cache.remove(&uname);
        }
        Ok(())
    }
}

impl std::fmt::Display for Lom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lom[{}]", self.uname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_fs::mountpath::MountpathSet;
    use strata_common::Provider;
    use tempfile::TempDir;

    fn fixture(n: usize) -> (TempDir, Arc<MountpathSet>) {
        let dir = TempDir::new().unwrap();
        let roots = (0..n)
            .map(|i| (dir.path().join(format!("mp{i}")), format!("mp{i}")))
            .collect();
        let set = MountpathSet::new(roots).unwrap();
        (dir, set)
    }

    fn put_object(lom: &Lom, payload: &[u8]) {
        std::fs::create_dir_all(lom.fqn.parent().unwrap()).unwrap();
        std::fs::write(&lom.fqn, payload).unwrap();
    }

    #[test]
    fn test_fill_missing_sets_flag() {
        let (_dir, set) = fixture(2);
        let mut lom = Lom::init(Bck::new("b", Provider::Ais), "ghost", &set).unwrap();
        lom.fill(FillFlags::STAT, None).unwrap();
        assert!(lom.does_not_exist);
    }

    #[test]
    fn test_persist_then_fresh_fill_roundtrip() {
        let (_dir, set) = fixture(2);
        let bck = Bck::new("b", Provider::Ais);
        let mut lom = Lom::init(bck.clone(), "o1", &set).unwrap();
        put_object(&lom, b"twelve bytes");
        lom.fill(FillFlags::STAT, None).unwrap();
        lom.compute_checksum(ChecksumType::XxHash64).unwrap();
        lom.version = Some("3".into());
        lom.persist(None).unwrap();

        let mut fresh = Lom::init(bck, "o1", &set).unwrap();
        fresh.fill(FillFlags::ALL, None).unwrap();
        assert_eq!(fresh.size, 12);
        assert_eq!(fresh.version.as_deref(), Some("3"));
        assert_eq!(fresh.cksum, lom.cksum);
        assert!(fresh.recompute_checksum().is_ok());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let (_dir, set) = fixture(1);
        let mut lom = Lom::init(Bck::new("b", Provider::Ais), "o", &set).unwrap();
        put_object(&lom, b"original");
        lom.compute_checksum(ChecksumType::Sha256).unwrap();
        std::fs::write(&lom.fqn, b"tampered").unwrap();
        match lom.recompute_checksum() {
            ChecksumVerdict::Mismatch { expected, got } => {
                assert_ne!(expected.value, got.value);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_add_copy_cross_references() {
        let (_dir, set) = fixture(3);
        let bck = Bck::new("m1", Provider::Ais);
        let mut lom = Lom::init(bck.clone(), "o", &set).unwrap();
        put_object(&lom, b"mirrored payload");
        lom.fill(FillFlags::STAT, None).unwrap();

        let dst = set
            .enabled()
            .into_iter()
            .find(|mp| mp.label != lom.mpath.label)
            .unwrap();
        let copy_fqn = lom.add_copy(&dst, None).unwrap();

        assert!(copy_fqn.exists());
        assert_eq!(std::fs::read(&copy_fqn).unwrap(), b"mirrored payload");
        assert!(lom.has_copy());

        let primary_block = lmeta::load(&lom.fqn).unwrap().unwrap();
        assert!(primary_block.copies.contains(&copy_fqn));
        let copy_block = lmeta::load(&copy_fqn).unwrap().unwrap();
        assert!(copy_block.copies.contains(&lom.fqn));

        // a registered copy classifies as a copy, not as misplaced
        let parsed = content::parse_fqn(&dst, &copy_fqn).unwrap();
        let mut copy_lom = Lom::from_fqn(parsed, &set).unwrap();
        copy_lom.fill(FillFlags::STAT.union(FillFlags::COPIES), None).unwrap();
        assert!(copy_lom.is_copy());
        assert!(!copy_lom.is_misplaced());
    }

    #[test]
    fn test_del_copy_updates_primary() {
        let (_dir, set) = fixture(2);
        let mut lom = Lom::init(Bck::new("b", Provider::Ais), "o", &set).unwrap();
        put_object(&lom, b"x");
        let dst = set
            .enabled()
            .into_iter()
            .find(|mp| mp.label != lom.mpath.label)
            .unwrap();
        let copy_fqn = lom.add_copy(&dst, None).unwrap();
        lom.del_copy(&copy_fqn, None).unwrap();
        assert!(!copy_fqn.exists());
        assert!(!lom.has_copy());
        let block = lmeta::load(&lom.fqn).unwrap().unwrap();
        assert!(block.copies.is_empty());
    }

    #[test]
    fn test_destroy_removes_everything() {
        let (_dir, set) = fixture(2);
        let cache = LomCache::new();
        let mut lom = Lom::init(Bck::new("b", Provider::Ais), "o", &set).unwrap();
        put_object(&lom, b"x");
        let dst = set
            .enabled()
            .into_iter()
            .find(|mp| mp.label != lom.mpath.label)
            .unwrap();
        let copy_fqn = lom.add_copy(&dst, Some(&cache)).unwrap();
        let (primary_fqn, uname) = (lom.fqn.clone(), lom.uname());
        lom.destroy(Some(&cache)).unwrap();
        assert!(!primary_fqn.exists());
        assert!(!copy_fqn.exists());
        assert!(cache.get(&uname).is_none());
    }

    #[test]
    fn test_misplacement_from_fqn() {
        let (_dir, set) = fixture(4);
        let bck = Bck::new("b", Provider::Ais);
        let home = Lom::init(bck.clone(), "obj", &set).unwrap();
        // drop the object onto some other mountpath
        let wrong = set
            .enabled()
            .into_iter()
            .find(|mp| mp.label != home.mpath.label)
            .unwrap();
        let wrong_fqn =
            content::make_path_obj(&wrong, ContentType::Object, &bck, "obj");
        let parsed = content::parse_fqn(&wrong, &wrong_fqn).unwrap();
        let lom = Lom::from_fqn(parsed, &set).unwrap();
        assert!(lom.is_misplaced());

        let parsed_home = content::parse_fqn(&home.mpath, &home.fqn).unwrap();
        let lom_home = Lom::from_fqn(parsed_home, &set).unwrap();
        assert!(!lom_home.is_misplaced());
    }
}
