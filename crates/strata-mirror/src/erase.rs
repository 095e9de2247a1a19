//! Erase-Copies
//!
//! Walks the bucket and deletes replicas down to the configured count;
//! `copies = 1` (or zero extra) removes every non-primary replica. Each
//! deletion updates the primary's copies list under the same exclusive
//! name-lock.

use crate::jog::{self, jog_result};
use crate::MirrorDeps;
use std::sync::Arc;
use strata_common::stats::CoreStats;
use strata_common::{Bck, Error, Result};
use strata_core::FillFlags;
use strata_fs::mountpath::Mountpath;
use strata_xaction::{Xact, XactArgs, XactBase, XactCustom, XactFactory, XactKind};
use tokio::sync::watch;

pub struct XactEraseCopies {
    base: XactBase,
    bck: Bck,
    /// Total replicas to keep, primary included
    keep: u32,
    deps: MirrorDeps,
}

impl Xact for XactEraseCopies {
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

impl XactEraseCopies {
    fn new(bck: Bck, keep: u32, uuid: Option<String>, deps: MirrorDeps) -> Self {
        Self {
            base: XactBase::new(XactKind::EraseCopies, Some(bck.clone()), uuid),
            bck,
            keep,
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
                    tokio::spawn(
                        async move { jog_result(xact.jog(mpath, stop).await, "erase-copies") },
                    )
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
                }
                results = &mut joggers => {
                    let deleted: u64 = results.into_iter().map(|r| r.unwrap_or(0)).sum();
                    tracing::info!(deleted, "{}: converged", self.base);
                    self.base.finish();
                    return;
                }
            }
        }
    }

    async fn jog(&self, mpath: Arc<Mountpath>, stop: watch::Receiver<bool>) -> Result<u64> {
        let mut deleted = 0u64;
        for fqn in jog::object_files(&mpath, &self.bck) {
            if jog::stopped(&stop, self.base.aborted()) {
                return Err(Error::aborted("erase-copies jogger"));
            }
            tokio::task::yield_now().await;

            let Some(lom) = jog::load_primary(&self.deps, &mpath, &fqn)? else {
                continue;
            };
            if !lom.has_copy() || lom.copies.len() + 1 <= self.keep as usize {
                continue;
            }
            deleted += self.trim(lom).await?;
        }
        Ok(deleted)
    }

    /// Trim one primary's replica set under its exclusive lock.
    async fn trim(&self, mut lom: strata_core::Lom) -> Result<u64> {
        let uname = lom.uname();
        let _guard = self.deps.locker.lock(&uname, true).await;
        lom.fill(FillFlags::STAT.union(FillFlags::COPIES), Some(&self.deps.cache))?;
        if lom.does_not_exist {
            return Ok(0);
        }
        let mut deleted = 0u64;
        while lom.copies.len() + 1 > self.keep.max(1) as usize {
            if self.base.aborted() {
                return Err(Error::aborted("erase-copies"));
            }
            let victim = lom.copies.last().cloned().expect("non-empty copies");
            lom.del_copy(&victim, Some(&self.deps.cache))?;
            CoreStats::inc(&self.deps.stats.copies_deleted);
            deleted += 1;
        }
        Ok(deleted)
    }
}

pub struct EraseCopiesFactory {
    deps: MirrorDeps,
}

impl EraseCopiesFactory {
    #[must_use]
    pub fn new(deps: MirrorDeps) -> Self {
        Self { deps }
    }
}

impl XactFactory for EraseCopiesFactory {
    fn kind(&self) -> XactKind {
        XactKind::EraseCopies
    }

    fn new_xact(&self, args: XactArgs) -> Result<Arc<dyn Xact>> {
        let bck = args
            .bck
            .ok_or_else(|| Error::invalid_argument("erase-copies needs a bucket"))?;
        let keep = match args.custom {
            XactCustom::Copies(n) => n,
            XactCustom::None => 1,
        };
        Ok(Arc::new(XactEraseCopies::new(
            bck,
            keep,
            args.uuid,
            self.deps.clone(),
        )))
    }

    fn pre_renew(&self, _prev: &Arc<dyn Xact>) -> Result<bool> {
        Ok(true)
    }
}
