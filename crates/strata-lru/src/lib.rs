//! Strata LRU - watermark-driven eviction
//!
//! Triggered when used capacity on any mountpath reaches the high
//! watermark; runs until used capacity drops to the low watermark or the
//! xaction is aborted. One jogger per `(mountpath, content-type)`:
//! workfile joggers garbage-collect orphaned workfiles, object joggers
//! collect eviction candidates into a bounded atime heap and then evict
//! coldest-first under exclusive name-locks, re-verifying the access
//! time at delete.
//!
//! The bucket-class order is configurable: `CloudFirst` (default) evicts
//! re-fetchable remote objects before native ones, `LocalFirst` the
//! observed legacy order.

mod heap;
mod throttle;

use heap::{Candidate, CandidateHeap};
use std::path::PathBuf;
use std::sync::Arc;
use strata_common::config::{Config, EvictionOrder};
use strata_common::stats::CoreStats;
use strata_common::{Error, Provider, Result};
use strata_core::{FillFlags, Lom, LomCache, NameLocker};
use strata_fs::content::{self, ContentType};
use strata_fs::mountpath::{Mountpath, MountpathSet};
use strata_fs::{fsutil, lmeta, Diskspace};
use strata_xaction::{Xact, XactArgs, XactBase, XactFactory, XactKind};
use walkdir::WalkDir;

/// Singleton handles the evictor needs; passed by construction.
#[derive(Clone)]
pub struct LruDeps {
    pub mpaths: Arc<MountpathSet>,
    pub locker: Arc<NameLocker>,
    pub cache: Arc<LomCache>,
    pub stats: Arc<CoreStats>,
    pub diskspace: Arc<dyn Diskspace>,
    pub config: Arc<Config>,
}

/// Whether any enabled mountpath crossed the high watermark.
#[must_use]
pub fn needs_eviction(deps: &LruDeps) -> bool {
    deps.mpaths.enabled().iter().any(|mp| {
        deps.diskspace
            .usage(&mp.path)
            .map(|u| u.pct_used() >= deps.config.lru.high_wm)
            .unwrap_or(false)
    })
}

pub struct XactLru {
    base: XactBase,
    deps: LruDeps,
}

impl Xact for XactLru {
    fn base(&self) -> &XactBase {
        &self.base
    }

    fn start(self: Arc<Self>) -> Result<()> {
        tokio::spawn(self.run());
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug, Default)]
struct JogStats {
    evicted: u64,
    evicted_bytes: u64,
    oldwork: u64,
}

impl XactLru {
    fn new(uuid: Option<String>, deps: LruDeps) -> Self {
        Self {
            base: XactBase::new(XactKind::Lru, None, uuid),
            deps,
        }
    }

    fn class_matches(cloud_class: bool, provider: Provider) -> bool {
        // everything non-native is re-fetchable and counts as cloud
        (provider != Provider::Ais) == cloud_class
    }

    async fn run(self: Arc<Self>) {
        let order = self.deps.config.lru.eviction_order;
        let classes: [bool; 2] = match order {
            EvictionOrder::CloudFirst => [true, false],
            EvictionOrder::LocalFirst => [false, true],
        };
        tracing::info!(
            "{}: started, dont-evict-time {:?}, order {order:?}",
            self.base,
            self.deps.config.lru.dont_evict_time
        );

        for cloud_class in classes {
            for ct in [ContentType::Workfile, ContentType::Object] {
                let enabled = self.deps.mpaths.enabled();
                let handles: Vec<_> = enabled
                    .into_iter()
                    .map(|mpath| {
                        let xact = Arc::clone(&self);
                        tokio::spawn(async move { xact.jog(mpath, ct, cloud_class).await })
                    })
                    .collect();
                let mut wave = futures::future::join_all(handles);

                tokio::select! {
                    _ = self.base.wait_aborted() => {
                        // joggers observe the abort at their next file
                        wave.await;
                        return;
                    }
                    results = &mut wave => {
                        for res in results {
                            match res {
                                Ok(Ok(stats)) => {
                                    tracing::debug!(?stats, cloud_class, "lru wave done");
                                }
                                Ok(Err(e)) if e.is_aborted() => {}
                                Ok(Err(e)) => {
                                    tracing::error!(error = %e, "lru jogger failed");
                                    CoreStats::inc(&self.deps.stats.errors);
                                }
                                Err(e) => tracing::error!(error = %e, "lru jogger panicked"),
                            }
                        }
                    }
                }
            }
        }
        self.base.finish();
    }

    async fn jog(&self, mpath: Arc<Mountpath>, ct: ContentType, cloud_class: bool) -> Result<JogStats> {
        let mut stats = JogStats::default();
        let usage = self.deps.diskspace.usage(&mpath.path)?;
        let to_evict = usage.bytes_over(self.deps.config.lru.low_wm);
        if ct == ContentType::Object && to_evict == 0 {
            return Ok(stats);
        }

        let mut heap = CandidateHeap::new(to_evict);
        let mut bytes_seen = 0u64;
        let mut next_check = self.deps.config.disk.capacity_check_interval;

        'walk: for root in self.class_roots(&mpath, ct, cloud_class) {
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if self.base.aborted() {
                    return Err(Error::aborted("lru jogger"));
                }
                if !entry.file_type().is_file() || lmeta::is_sidecar(entry.path()) {
                    continue;
                }
                let meta = match entry.metadata() {
                    Ok(meta) => meta,
                    Err(_) => continue, // raced with a delete
                };
                bytes_seen += meta.len();

                match ct {
                    ContentType::Workfile => self.sweep_oldwork(entry.path(), &meta, &mut stats),
                    ContentType::Object => {
                        self.consider(&mpath, entry.path(), &meta, &mut heap);
                    }
                }

                // yield: abort checked above, capacity and throttle here
                tokio::task::yield_now().await;
                if bytes_seen >= next_check {
                    next_check = bytes_seen + self.deps.config.disk.capacity_check_interval;
                    let usage = self.deps.diskspace.usage(&mpath.path)?;
                    if ct == ContentType::Object
                        && usage.pct_used() <= self.deps.config.lru.low_wm
                    {
                        break 'walk;
                    }
                    let util = self.deps.diskspace.utilization(&mpath.path);
                    if let Some(delay) = throttle::throttle_delay(util, &self.deps.config.disk) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if ct == ContentType::Object {
            self.evict(&mpath, heap, to_evict, &mut stats).await?;
        }
        Ok(stats)
    }

    /// Provider roots of one content type matching the bucket class.
    fn class_roots(&self, mpath: &Mountpath, ct: ContentType, cloud_class: bool) -> Vec<PathBuf> {
        let ct_root = mpath.path.join(ct.prefix());
        let Ok(read_dir) = std::fs::read_dir(&ct_root) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| Provider::parse(name).ok())
                    .is_some_and(|p| Self::class_matches(cloud_class, p))
            })
            .map(|e| e.path())
            .collect()
    }

    /// Workfiles older than the don't-evict window are orphans; unlink.
    fn sweep_oldwork(&self, path: &std::path::Path, meta: &std::fs::Metadata, stats: &mut JogStats) {
        let age = fsutil::age_of(fsutil::mtime_ns(meta));
        if age <= self.deps.config.lru.dont_evict_time {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                stats.oldwork += 1;
                CoreStats::inc(&self.deps.stats.oldwork_removed);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "oldwork unlink failed"),
        }
    }

    /// Classify one object file; cold unlocked primaries become
    /// candidates, everything else is skipped.
    fn consider(
        &self,
        mpath: &Arc<Mountpath>,
        path: &std::path::Path,
        meta: &std::fs::Metadata,
        heap: &mut CandidateHeap,
    ) {
        let Some(parsed) = content::parse_fqn(mpath, path) else {
            return;
        };
        let Ok(mut lom) = Lom::from_fqn(parsed, &self.deps.mpaths) else {
            return;
        };
        if lom
            .fill(
                FillFlags::STAT.union(FillFlags::ATIME).union(FillFlags::COPIES),
                Some(&self.deps.cache),
            )
            .is_err()
            || lom.does_not_exist
        {
            return;
        }
        if !lom.is_primary() {
            // copies go with their primary; misplaced is rebalance's job
            return;
        }
        if fsutil::age_of(lom.atime_ns) <= self.deps.config.lru.dont_evict_time {
            return; // hot
        }
        if self.deps.locker.is_locked(&lom.uname()) {
            return; // contended; never stall client I/O
        }
        heap.push(Candidate {
            atime_ns: lom.atime_ns,
            size: meta.len(),
            fqn: lom.fqn.clone(),
        });
    }

    /// Drain the heap coldest-first, re-verifying each candidate under
    /// its exclusive name-lock before unlinking.
    async fn evict(
        &self,
        mpath: &Arc<Mountpath>,
        heap: CandidateHeap,
        to_evict: u64,
        stats: &mut JogStats,
    ) -> Result<()> {
        for cand in heap.drain_coldest() {
            if stats.evicted_bytes >= to_evict {
                break;
            }
            if self.base.aborted() {
                return Err(Error::aborted("lru evict"));
            }
            let Some(parsed) = content::parse_fqn(mpath, &cand.fqn) else {
                continue;
            };
            let Ok(mut lom) = Lom::from_fqn(parsed, &self.deps.mpaths) else {
                continue;
            };
            let uname = lom.uname();
            let Some(_guard) = self.deps.locker.try_lock(&uname, true) else {
                continue; // contended since the walk; skip
            };
            lom.fill(
                FillFlags::STAT.union(FillFlags::ATIME).union(FillFlags::COPIES),
                None,
            )?;
            if lom.does_not_exist {
                continue;
            }
            if lom.atime_ns > cand.atime_ns {
                continue; // touched since enqueue
            }
            let size = lom.size;
            lom.destroy(Some(&self.deps.cache))?;
            stats.evicted += 1;
            stats.evicted_bytes += size;
            CoreStats::inc(&self.deps.stats.evictions);
            CoreStats::add(&self.deps.stats.evicted_bytes, size);
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

pub struct LruFactory {
    deps: LruDeps,
}

impl LruFactory {
    #[must_use]
    pub fn new(deps: LruDeps) -> Self {
        Self { deps }
    }
}

impl XactFactory for LruFactory {
    fn kind(&self) -> XactKind {
        XactKind::Lru
    }

    fn new_xact(&self, args: XactArgs) -> Result<Arc<dyn Xact>> {
        Ok(Arc::new(XactLru::new(args.uuid, self.deps.clone())))
    }

    /// A running eviction keeps serving renewals.
    fn pre_renew(&self, _prev: &Arc<dyn Xact>) -> Result<bool> {
        Ok(true)
    }
}
