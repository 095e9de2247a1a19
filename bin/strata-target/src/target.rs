//! The target engine: singleton wiring and lifecycle
//!
//! Every global of the engine — the mountpath set, the name-locker, the
//! LOM cache, the multipart registry, the xaction registry, the cluster
//! map — is created here once and passed to workers by construction.
//! Lifecycle is `init -> run -> shutdown`, shutdown idempotent.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_common::stats::CoreStats;
use strata_common::{Config, Result};
use strata_core::{LomCache, NameLocker};
use strata_fs::{Diskspace, DuUsage, MountpathSet, Statvfs};
use strata_lru::{needs_eviction, LruDeps, LruFactory};
use strata_mirror::{EraseCopiesFactory, MakeNCopiesFactory, MirrorDeps, PutCopiesFactory};
use strata_placement::{Smap, SmapOwner, Snode};
use strata_s3::MptRegistry;
use strata_xaction::{Housekeeper, XactArgs, XactKind, XactRegistry};

pub struct Target {
    pub node_id: String,
    pub config: Arc<Config>,
    pub mpaths: Arc<MountpathSet>,
    pub locker: Arc<NameLocker>,
    pub cache: Arc<LomCache>,
    pub stats: Arc<CoreStats>,
    pub diskspace: Arc<dyn Diskspace>,
    pub mpt: Arc<MptRegistry>,
    pub registry: Arc<XactRegistry>,
    pub smap: Arc<SmapOwner>,
    hk: Housekeeper,
    shut: AtomicBool,
}

impl Target {
    /// Build and wire the engine. The factory table is frozen before
    /// this returns; nothing renews before then.
    pub fn init(
        node_id: String,
        config: Config,
        mountpath_roots: Vec<(PathBuf, String)>,
        capacity_override: Option<u64>,
    ) -> Result<Arc<Self>> {
        config
            .lru
            .validate()
            .map_err(strata_common::Error::invalid_argument)?;
        let config = Arc::new(config);
        let mpaths = MountpathSet::new(mountpath_roots)?;
        let locker = Arc::new(NameLocker::new());
        let cache = Arc::new(LomCache::new());
        let stats = Arc::new(CoreStats::default());
        let diskspace: Arc<dyn Diskspace> = match capacity_override {
            Some(capacity) => Arc::new(DuUsage::new(capacity)),
            None => Arc::new(Statvfs),
        };

        let registry = Arc::new(XactRegistry::new());
        let mirror_deps = MirrorDeps {
            mpaths: Arc::clone(&mpaths),
            locker: Arc::clone(&locker),
            cache: Arc::clone(&cache),
            stats: Arc::clone(&stats),
        };
        registry.register_factory(Arc::new(MakeNCopiesFactory::new(mirror_deps.clone())));
        registry.register_factory(Arc::new(EraseCopiesFactory::new(mirror_deps.clone())));
        registry.register_factory(Arc::new(PutCopiesFactory::new(
            mirror_deps,
            512,
            config.timeout.xact_idle,
        )));
        registry.register_factory(Arc::new(LruFactory::new(LruDeps {
            mpaths: Arc::clone(&mpaths),
            locker: Arc::clone(&locker),
            cache: Arc::clone(&cache),
            stats: Arc::clone(&stats),
            diskspace: Arc::clone(&diskspace),
            config: Arc::clone(&config),
        })));
        registry.freeze();

        let mut smap = Smap::new(1);
        smap.insert(Snode::new(format!("t[{node_id}]")));

        let target = Arc::new(Self {
            node_id,
            config,
            mpaths,
            locker,
            cache,
            stats,
            diskspace,
            mpt: Arc::new(MptRegistry::new()),
            registry,
            smap: Arc::new(SmapOwner::new(smap)),
            hk: Housekeeper::new(),
            shut: AtomicBool::new(false),
        });
        target.register_chores();
        Ok(target)
    }

    fn register_chores(self: &Arc<Self>) {
        let idle = self.config.timeout.xact_idle;
        let sweep_every = (idle / 2).max(Duration::from_secs(1));
        let reg = Arc::clone(&self.registry);
        self.hk.register("xact-idle-sweep", sweep_every, move || {
            reg.abort_idle();
        });

        let retention = self.config.timeout.xact_retention;
        let reg = Arc::clone(&self.registry);
        self.hk.register("xact-gc", retention / 4, move || {
            reg.gc_terminal(retention);
        });

        // the LRU trigger: probe used capacity, renew eviction at the
        // high watermark (weak handles keep shutdown-by-drop working)
        let target = Arc::downgrade(self);
        self.hk.register(
            "capacity-monitor",
            self.config.lru.capacity_upd_time,
            move || {
                if let Some(target) = target.upgrade() {
                    target.check_capacity();
                }
            },
        );

        // a mountpath change invalidates cached HRW-dependent metadata
        let target = Arc::downgrade(self);
        let listener = self.mpaths.subscribe();
        tokio::spawn(async move {
            loop {
                listener.changed().await;
                let Some(target) = target.upgrade() else { return };
                if target.shut.load(Ordering::Acquire) {
                    return;
                }
                tracing::info!("mountpath change: dropping LOM cache");
                target.cache.clear_bucket("");
            }
        });
    }

    /// One capacity-monitor tick.
    pub fn check_capacity(&self) {
        if !self.config.lru.enabled || self.shut.load(Ordering::Acquire) {
            return;
        }
        let deps = LruDeps {
            mpaths: Arc::clone(&self.mpaths),
            locker: Arc::clone(&self.locker),
            cache: Arc::clone(&self.cache),
            stats: Arc::clone(&self.stats),
            diskspace: Arc::clone(&self.diskspace),
            config: Arc::clone(&self.config),
        };
        if !needs_eviction(&deps) {
            return;
        }
        tracing::warn!("capacity above high watermark, renewing LRU eviction");
        if let Err(e) = self.registry.renew(XactKind::Lru, XactArgs::default()) {
            tracing::error!(error = %e, "LRU renewal failed");
        }
    }

    /// Prometheus text for the metrics endpoint.
    #[must_use]
    pub fn metrics_text(&self) -> String {
        use std::fmt::Write as _;
        let mut out = self.stats.export_prometheus(&self.node_id);
        writeln!(out, "# TYPE strata_mountpath_used_percent gauge").unwrap();
        for mp in self.mpaths.enabled() {
            if let Ok(usage) = self.diskspace.usage(&mp.path) {
                writeln!(
                    out,
                    "strata_mountpath_used_percent{{node=\"{}\",mountpath=\"{}\"}} {}",
                    self.node_id,
                    mp.label,
                    usage.pct_used()
                )
                .unwrap();
            }
        }
        out
    }

    #[must_use]
    pub fn healthy(&self) -> bool {
        !self.shut.load(Ordering::Acquire) && !self.mpaths.enabled().is_empty()
    }

    /// Abort every xaction and stop housekeeping. Idempotent.
    pub fn shutdown(&self) {
        if self.shut.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("target shutting down");
        self.registry.abort_all();
        self.hk.shutdown();
    }
}

impl Drop for Target {
    fn drop(&mut self) {
        self.shutdown();
    }
}
