//! Put-Copies - the on-demand PUT-path copier
//!
//! A PUT into a mirrored bucket enqueues the freshly written object here
//! instead of replicating inline. The xaction idles between requests and
//! the housekeeper reaps it once `pending == 0` past the idle timeout;
//! the next PUT renews it.

use crate::jog;
use crate::MirrorDeps;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use strata_common::stats::CoreStats;
use strata_common::{Bck, Error, Result};
use strata_core::{FillFlags, Lom};
use strata_xaction::{DemandState, Xact, XactArgs, XactBase, XactCustom, XactFactory, XactKind};
use tokio::sync::mpsc;

pub struct XactPutCopies {
    base: XactBase,
    demand: DemandState,
    bck: Bck,
    copies: u32,
    deps: MirrorDeps,
    tx: mpsc::Sender<String>,
    rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl Xact for XactPutCopies {
    fn base(&self) -> &XactBase {
        &self.base
    }

    fn start(self: Arc<Self>) -> Result<()> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| Error::internal("put-copies started twice"))?;
        tokio::spawn(self.run(rx));
        Ok(())
    }

    fn as_demand(&self) -> Option<&DemandState> {
        Some(&self.demand)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl XactPutCopies {
    fn new(
        bck: Bck,
        copies: u32,
        burst: usize,
        idle_timeout: Duration,
        uuid: Option<String>,
        deps: MirrorDeps,
    ) -> Self {
        let (tx, rx) = mpsc::channel(burst.max(1));
        Self {
            base: XactBase::new(XactKind::PutCopies, Some(bck.clone()), uuid),
            demand: DemandState::new(idle_timeout),
            bck,
            copies,
            deps,
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Request replication of one just-written object. Returns `Conflict`
    /// when the burst queue is full (the PUT itself already succeeded).
    pub fn enqueue(&self, obj_name: &str) -> Result<()> {
        if self.base.finished() {
            return Err(Error::aborted("put-copies"));
        }
        self.demand.inc_pending();
        match self.tx.try_send(obj_name.to_string()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.demand.dec_pending();
                tracing::warn!(obj_name, "put-copies burst queue full, dropping");
                Err(Error::conflict(format!("put-copies queue full: {e}")))
            }
        }
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<String>) {
        loop {
            tokio::select! {
                _ = self.base.wait_aborted() => {
                    rx.close();
                    // drain without processing; senders already counted
                    while rx.try_recv().is_ok() {
                        self.demand.dec_pending();
                    }
                    return;
                }
                item = rx.recv() => {
                    let Some(obj_name) = item else {
                        self.base.finish();
                        return;
                    };
                    if let Err(e) = self.replicate_one(&obj_name).await {
                        if !e.is_aborted() {
                            tracing::error!(obj_name, error = %e, "put-copies failed");
                            CoreStats::inc(&self.deps.stats.errors);
                        }
                    }
                    self.demand.dec_pending();
                }
            }
        }
    }

    async fn replicate_one(&self, obj_name: &str) -> Result<()> {
        let mut lom = Lom::init(self.bck.clone(), obj_name, &self.deps.mpaths)?;
        let uname = lom.uname();
        let _guard = self.deps.locker.lock(&uname, true).await;
        lom.fill(FillFlags::STAT.union(FillFlags::COPIES), Some(&self.deps.cache))?;
        if lom.does_not_exist {
            return Err(Error::not_found(uname));
        }
        while lom.copies.len() + 1 < self.copies as usize {
            if self.base.aborted() {
                return Err(Error::aborted("put-copies"));
            }
            let Some(dst) = jog::next_copy_target(&self.deps, &lom) else {
                tracing::warn!(%lom, "not enough mountpaths, truncating copy plan");
                break;
            };
            lom.add_copy(&dst, Some(&self.deps.cache))?;
            CoreStats::inc(&self.deps.stats.copies_created);
        }
        Ok(())
    }
}

pub struct PutCopiesFactory {
    deps: MirrorDeps,
    burst: usize,
    idle_timeout: Duration,
}

impl PutCopiesFactory {
    #[must_use]
    pub fn new(deps: MirrorDeps, burst: usize, idle_timeout: Duration) -> Self {
        Self {
            deps,
            burst,
            idle_timeout,
        }
    }
}

impl XactFactory for PutCopiesFactory {
    fn kind(&self) -> XactKind {
        XactKind::PutCopies
    }

    fn new_xact(&self, args: XactArgs) -> Result<Arc<dyn Xact>> {
        let bck = args
            .bck
            .ok_or_else(|| Error::invalid_argument("put-copies needs a bucket"))?;
        let XactCustom::Copies(copies) = args.custom else {
            return Err(Error::invalid_argument("put-copies needs a copy count"));
        };
        Ok(Arc::new(XactPutCopies::new(
            bck,
            copies,
            self.burst,
            self.idle_timeout,
            args.uuid,
            self.deps.clone(),
        )))
    }
}
