//! Small filesystem helpers shared by the workers

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use strata_common::Result;

/// Access time of a file in nanoseconds since the epoch.
pub fn atime_ns(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.atime() * 1_000_000_000 + meta.atime_nsec()
}

/// Modification time of a file in nanoseconds since the epoch.
pub fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() * 1_000_000_000 + meta.mtime_nsec()
}

/// Current wall-clock time in nanoseconds since the epoch.
#[must_use]
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Set both atime and mtime of `path` to `ns` (nanoseconds since epoch).
pub fn set_times_ns(path: &Path, ns: i64) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| strata_common::Error::invalid_argument("path contains NUL"))?;
    let ts = libc::timespec {
        tv_sec: ns / 1_000_000_000,
        tv_nsec: ns % 1_000_000_000,
    };
    let times = [ts, ts];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Duration since `ns`; zero if `ns` is in the future.
#[must_use]
pub fn age_of(ns: i64) -> Duration {
    let now = now_ns();
    if now <= ns {
        Duration::ZERO
    } else {
        Duration::from_nanos((now - ns) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_read_times() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let past = now_ns() - 3_600_000_000_000; // one hour ago
        set_times_ns(&path, past).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let atime = atime_ns(&meta);
        assert!((atime - past).abs() < 1_000_000_000, "atime {atime} vs {past}");
        assert!(age_of(atime) >= Duration::from_secs(3599));
    }

    #[test]
    fn test_age_of_future_is_zero() {
        assert_eq!(age_of(now_ns() + 1_000_000_000), Duration::ZERO);
    }
}
