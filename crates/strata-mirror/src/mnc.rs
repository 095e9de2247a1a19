//! Make-N-Copies
//!
//! Walks every enabled mountpath of the bucket and adds replicas until
//! each primary has `copies - 1` of them. The copy plan is HRW over the
//! enabled set minus the replica holders; when fewer mountpaths exist
//! than requested copies the plan truncates with a warning.

use crate::jog::{self, jog_result};
use crate::MirrorDeps;
use std::sync::Arc;
use strata_common::stats::CoreStats;
use strata_common::{Bck, Error, Result};
use strata_core::FillFlags;
use strata_fs::mountpath::Mountpath;
use strata_xaction::{Xact, XactArgs, XactBase, XactCustom, XactFactory, XactKind};
use tokio::sync::watch;

pub struct XactMakeNCopies {
    base: XactBase,
    bck: Bck,
    copies: u32,
    deps: MirrorDeps,
}

impl Xact for XactMakeNCopies {
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

impl XactMakeNCopies {
    fn new(bck: Bck, copies: u32, uuid: Option<String>, deps: MirrorDeps) -> Self {
        Self {
            base: XactBase::new(XactKind::MakeNCopies, Some(bck.clone()), uuid),
            bck,
            copies,
            deps,
        }
    }

    async fn run(self: Arc<Self>) {
        let listener = self.deps.mpaths.subscribe();
        loop {
            let enabled = self.deps.mpaths.enabled();
            if enabled.is_empty() {
                tracing::error!("{}: no mountpaths, exiting", self.base);
                self.base.abort();
                return;
            }
            let (stop_tx, _) = watch::channel(false);
            let handles: Vec<_> = enabled
                .iter()
                .map(|mpath| {
                    let xact = Arc::clone(&self);
                    let mpath = Arc::clone(mpath);
                    let stop = stop_tx.subscribe();
                    tokio::spawn(async move {
                        jog_result(xact.jog(mpath, stop).await, "make-n-copies")
                    })
                })
                .collect();
            let mut joggers = futures::future::join_all(handles);

            tokio::select! {
                _ = self.base.wait_aborted() => {
                    let _ = stop_tx.send(true);
                    joggers.await;
                    return;
                }
                _ = listener.changed() => {
                    tracing::info!("{}: mountpath change, restarting joggers", self.base);
                    let _ = stop_tx.send(true);
                    joggers.await;
                    // loop re-snapshots the set; further changes coalesced
                }
                results = &mut joggers => {
                    let created: u64 = results.into_iter().map(|r| r.unwrap_or(0)).sum();
                    tracing::info!(created, "{}: converged", self.base);
                    self.base.finish();
                    return;
                }
            }
        }
    }

    async fn jog(&self, mpath: Arc<Mountpath>, stop: watch::Receiver<bool>) -> Result<u64> {
        let mut created = 0u64;
        for fqn in jog::object_files(&mpath, &self.bck) {
            if jog::stopped(&stop, self.base.aborted()) {
                return Err(Error::aborted("make-n-copies jogger"));
            }
            tokio::task::yield_now().await;

            let Some(lom) = jog::load_primary(&self.deps, &mpath, &fqn)? else {
                continue;
            };
            if lom.copies.len() + 1 >= self.copies as usize {
                continue;
            }
            created += self.replicate(lom).await?;
        }
        Ok(created)
    }

    /// Bring one primary up to the target count under its exclusive lock.
    async fn replicate(&self, mut lom: strata_core::Lom) -> Result<u64> {
        let uname = lom.uname();
        let _guard = self.deps.locker.lock(&uname, true).await;
        // re-fill under the lock; a concurrent writer may have advanced it
        lom.fill(FillFlags::STAT.union(FillFlags::COPIES), Some(&self.deps.cache))?;
        if lom.does_not_exist {
            return Ok(0);
        }
        let mut created = 0u64;
        while lom.copies.len() + 1 < self.copies as usize {
            if self.base.aborted() {
                return Err(Error::aborted("make-n-copies"));
            }
            let Some(dst) = jog::next_copy_target(&self.deps, &lom) else {
                tracing::warn!(
                    %lom,
                    want = self.copies,
                    have = lom.copies.len() + 1,
                    "not enough mountpaths, truncating copy plan"
                );
                break;
            };
            lom.add_copy(&dst, Some(&self.deps.cache))?;
            CoreStats::inc(&self.deps.stats.copies_created);
            created += 1;
        }
        Ok(created)
    }
}

pub struct MakeNCopiesFactory {
    deps: MirrorDeps,
}

impl MakeNCopiesFactory {
    #[must_use]
    pub fn new(deps: MirrorDeps) -> Self {
        Self { deps }
    }
}

impl XactFactory for MakeNCopiesFactory {
    fn kind(&self) -> XactKind {
        XactKind::MakeNCopies
    }

    fn new_xact(&self, args: XactArgs) -> Result<Arc<dyn Xact>> {
        let bck = args
            .bck
            .ok_or_else(|| Error::invalid_argument("make-n-copies needs a bucket"))?;
        let XactCustom::Copies(copies) = args.custom else {
            return Err(Error::invalid_argument("make-n-copies needs a copy count"));
        };
        if copies < 1 {
            return Err(Error::invalid_argument("copies must be >= 1"));
        }
        Ok(Arc::new(XactMakeNCopies::new(
            bck,
            copies,
            args.uuid,
            self.deps.clone(),
        )))
    }

    /// A running instance keeps serving the renewal (idempotent start).
    fn pre_renew(&self, _prev: &Arc<dyn Xact>) -> Result<bool> {
        Ok(true)
    }
}
