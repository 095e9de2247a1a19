//! Filesystem usage probes
//!
//! The LRU trigger and the worker throttles need used-capacity numbers.
//! Production uses `statvfs(2)`; tests (and capacity-managed roots) use
//! the du-style walker with a configured total.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_common::{Error, Result};
use walkdir::WalkDir;

/// A point-in-time usage sample of one filesystem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsUsage {
    pub total: u64,
    pub used: u64,
}

impl FsUsage {
    /// Used percentage, 0..=100
    #[must_use]
    pub fn pct_used(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.used.saturating_mul(100)) / self.total).min(100) as u8
    }

    /// Bytes to free to get down to `low_wm` percent
    #[must_use]
    pub fn bytes_over(&self, low_wm: u8) -> u64 {
        let target = self.total / 100 * u64::from(low_wm);
        self.used.saturating_sub(target)
    }
}

/// Usage provider; injected so tests control capacity
pub trait Diskspace: Send + Sync {
    fn usage(&self, path: &Path) -> Result<FsUsage>;

    /// Disk utilization percentage used by worker throttles. The default
    /// approximates with used capacity.
    fn utilization(&self, path: &Path) -> u8 {
        self.usage(path).map(|u| u.pct_used()).unwrap_or(0)
    }
}

/// `statvfs(2)`-backed usage
#[derive(Debug, Default)]
pub struct Statvfs;

impl Diskspace for Statvfs {
    fn usage(&self, path: &Path) -> Result<FsUsage> {
        use std::os::unix::ffi::OsStrExt;
        let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::invalid_argument("path contains NUL"))?;
        let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut vfs) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        let frsize = vfs.f_frsize.max(1);
        let total = vfs.f_blocks as u64 * frsize as u64;
        let free = vfs.f_bavail as u64 * frsize as u64;
        Ok(FsUsage {
            total,
            used: total.saturating_sub(free),
        })
    }
}

/// du-style usage against a configured capacity; a walk per probe, so
/// callers cache samples between `capacity_upd_time` ticks.
#[derive(Debug)]
pub struct DuUsage {
    capacity: AtomicU64,
}

impl DuUsage {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: AtomicU64::new(capacity),
        }
    }

    pub fn set_capacity(&self, capacity: u64) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }
}

impl Diskspace for DuUsage {
    fn usage(&self, path: &Path) -> Result<FsUsage> {
        let mut used = 0u64;
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                used += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(FsUsage {
            total: self.capacity.load(Ordering::Relaxed),
            used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pct_and_bytes_over() {
        let usage = FsUsage {
            total: 1000,
            used: 910,
        };
        assert_eq!(usage.pct_used(), 91);
        assert_eq!(usage.bytes_over(80), 110);
        assert_eq!(
            FsUsage {
                total: 1000,
                used: 100
            }
            .bytes_over(80),
            0
        );
    }

    #[test]
    fn test_du_usage_counts_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("sub/b"), vec![0u8; 50]).unwrap();

        let du = DuUsage::new(1000);
        let usage = du.usage(dir.path()).unwrap();
        assert_eq!(usage.used, 150);
        assert_eq!(usage.pct_used(), 15);
    }

    #[test]
    fn test_statvfs_probes_something() {
        let usage = Statvfs.usage(Path::new("/")).unwrap();
        assert!(usage.total > 0);
        assert!(usage.used <= usage.total);
    }
}
