//! Per-object-key name locks
//!
//! A sharded map from unique object names to shared/exclusive lock
//! states. Sharding removes global contention; records are refcounted
//! and evicted at zero so the table stays bounded by the number of
//! in-flight operations.
//!
//! Upgrade is not supported: pick exclusive up front or release and
//! reacquire. When two keys are held at once (rename), acquire in sorted
//! key order.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use xxhash_rust::xxh64::xxh64;

const SHARD_COUNT: usize = 256;
const RETRY_MIN: Duration = Duration::from_millis(1);
const RETRY_MAX: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct LockState {
    exclusive: bool,
    shared: u32,
}

#[derive(Default)]
struct Shard {
    map: Mutex<HashMap<String, LockState>>,
}

/// The sharded lock table
pub struct NameLocker {
    shards: Vec<Shard>,
}

impl Default for NameLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl NameLocker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
        }
    }

    fn shard(&self, uname: &str) -> &Shard {
        let h = xxh64(uname.as_bytes(), 0) as usize;
        &self.shards[h % SHARD_COUNT]
    }

    /// Non-blocking acquisition; `None` on contention.
    #[must_use]
    pub fn try_lock<'a>(&'a self, uname: &str, exclusive: bool) -> Option<NameLockGuard<'a>> {
        let mut map = self.shard(uname).map.lock();
        let state = map.entry(uname.to_string()).or_default();
        let granted = if exclusive {
            if state.exclusive || state.shared > 0 {
                false
            } else {
                state.exclusive = true;
                true
            }
        } else if state.exclusive {
            false
        } else {
            state.shared += 1;
            true
        };
        drop(map);
        granted.then(|| NameLockGuard {
            locker: self,
            uname: uname.to_string(),
            exclusive,
        })
    }

    /// Blocking acquisition: poll with jittered backoff. Every await is a
    /// cancellation point, so an aborted caller leaves no lock behind.
    pub async fn lock<'a>(&'a self, uname: &str, exclusive: bool) -> NameLockGuard<'a> {
        let mut delay = RETRY_MIN;
        loop {
            if let Some(guard) = self.try_lock(uname, exclusive) {
                return guard;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RETRY_MAX);
        }
    }

    /// Acquire two keys in sorted order (the rename discipline); both
    /// exclusive.
    pub async fn lock_pair<'a>(
        &'a self,
        a: &str,
        b: &str,
    ) -> (NameLockGuard<'a>, NameLockGuard<'a>) {
        debug_assert_ne!(a, b);
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let g1 = self.lock(first, true).await;
        let g2 = self.lock(second, true).await;
        if a < b {
            (g1, g2)
        } else {
            (g2, g1)
        }
    }

    /// Whether any lock is currently held on `uname`.
    #[must_use]
    pub fn is_locked(&self, uname: &str) -> bool {
        self.shard(uname).map.lock().contains_key(uname)
    }

    fn unlock(&self, uname: &str, exclusive: bool) {
        let mut map = self.shard(uname).map.lock();
        let remove = match map.get_mut(uname) {
            Some(state) => {
                if exclusive {
                    debug_assert!(state.exclusive);
                    state.exclusive = false;
                } else {
                    debug_assert!(state.shared > 0);
                    state.shared -= 1;
                }
                !state.exclusive && state.shared == 0
            }
            None => {
                debug_assert!(false, "unlock of unheld name {uname}");
                false
            }
        };
        if remove {
            map.remove(uname);
        }
    }
}

/// RAII lock guard; releases on drop so abort paths cannot leak locks.
pub struct NameLockGuard<'a> {
    locker: &'a NameLocker,
    uname: String,
    exclusive: bool,
}

impl NameLockGuard<'_> {
    #[must_use]
    pub fn uname(&self) -> &str {
        &self.uname
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for NameLockGuard<'_> {
    fn drop(&mut self) {
        self.locker.unlock(&self.uname, self.exclusive);
    }
}
