//! End-to-end mirror scenarios against real (temp) filesystems.

use std::sync::Arc;
use std::time::Duration;
use strata_common::stats::CoreStats;
use strata_common::{Bck, Provider};
use strata_core::{FillFlags, Lom, LomCache, NameLocker};
use strata_fs::content::{self, ContentType};
use strata_fs::lmeta;
use strata_fs::mountpath::MountpathSet;
use strata_mirror::{EraseCopiesFactory, MakeNCopiesFactory, MirrorDeps, PutCopiesFactory, XactPutCopies};
use strata_placement::hrw_mountpath_idx;
use strata_xaction::{Xact, XactArgs, XactKind, XactRegistry};
use tempfile::TempDir;

fn fixture(n: usize) -> (TempDir, Arc<MountpathSet>, MirrorDeps) {
    let dir = TempDir::new().unwrap();
    let roots = (0..n)
        .map(|i| (dir.path().join(format!("mp{i}")), format!("mp{i}")))
        .collect();
    let mpaths = MountpathSet::new(roots).unwrap();
    let deps = MirrorDeps {
        mpaths: Arc::clone(&mpaths),
        locker: Arc::new(NameLocker::new()),
        cache: Arc::new(LomCache::new()),
        stats: Arc::new(CoreStats::default()),
    };
    (dir, mpaths, deps)
}

fn put_object(mpaths: &MountpathSet, bck: &Bck, obj_name: &str, payload: &[u8]) -> Lom {
    let lom = Lom::init(bck.clone(), obj_name, mpaths).unwrap();
    std::fs::create_dir_all(lom.fqn.parent().unwrap()).unwrap();
    std::fs::write(&lom.fqn, payload).unwrap();
    lom
}

async fn await_terminal(entry: &Arc<dyn Xact>, secs: u64) {
    tokio::time::timeout(Duration::from_secs(secs), async {
        while !entry.base().finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("xaction never reached a terminal state");
}

fn registry_with_mirror(deps: &MirrorDeps) -> XactRegistry {
    let reg = XactRegistry::new();
    reg.register_factory(Arc::new(MakeNCopiesFactory::new(deps.clone())));
    reg.register_factory(Arc::new(EraseCopiesFactory::new(deps.clone())));
    reg.register_factory(Arc::new(PutCopiesFactory::new(
        deps.clone(),
        64,
        Duration::from_millis(50),
    )));
    reg.freeze();
    reg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mirror_steady_state() {
    let (_dir, mpaths, deps) = fixture(3);
    let reg = registry_with_mirror(&deps);
    let bck = Bck::new("m1", Provider::Ais);

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    let lom = put_object(&mpaths, &bck, "o", &payload);

    let res = reg
        .renew(
            XactKind::MakeNCopies,
            XactArgs::for_bck(bck.clone()).with_copies(2),
        )
        .unwrap();
    assert!(res.is_new);
    await_terminal(&res.entry, 30).await;
    assert!(!res.entry.base().aborted());

    // exactly 2 of the 3 mountpaths hold the content
    let holders: Vec<_> = mpaths
        .enabled()
        .into_iter()
        .filter(|mp| {
            content::make_path_obj(mp, ContentType::Object, &bck, "o").exists()
        })
        .collect();
    assert_eq!(holders.len(), 2);

    // the primary sits on HRW(mountpaths, uname), the copy on
    // HRW(mountpaths \ primary, uname)
    let uname = bck.uname("o");
    let enabled = mpaths.enabled();
    let labels: Vec<&str> = enabled.iter().map(|mp| mp.label.as_str()).collect();
    let primary_idx = hrw_mountpath_idx(&labels, &uname).unwrap();
    let copy_idx = strata_placement::hrw_copies(&labels, &uname, 1, &[primary_idx])[0];
    assert!(holders.iter().any(|mp| mp.label == labels[primary_idx]));
    assert!(holders.iter().any(|mp| mp.label == labels[copy_idx]));

    // both endpoints reference each other
    let copy_fqn = content::make_path_obj(&enabled[copy_idx], ContentType::Object, &bck, "o");
    let primary_block = lmeta::load(&lom.fqn).unwrap().unwrap();
    assert!(primary_block.copies.contains(&copy_fqn));
    let copy_block = lmeta::load(&copy_fqn).unwrap().unwrap();
    assert!(copy_block.copies.contains(&lom.fqn));
    assert_eq!(std::fs::read(&copy_fqn).unwrap(), payload);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_renew_running_mnc_returns_same_entry() {
    let (_dir, mpaths, deps) = fixture(3);
    let reg = Arc::new(registry_with_mirror(&deps));
    let bck = Bck::new("b1", Provider::Ais);
    for i in 0..20 {
        put_object(&mpaths, &bck, &format!("o{i}"), b"payload");
    }

    let args = || XactArgs::for_bck(bck.clone()).with_copies(2);
    let (r1, r2) = tokio::join!(
        {
            let reg = Arc::clone(&reg);
            let args = args();
            async move { reg.renew(XactKind::MakeNCopies, args).unwrap() }
        },
        {
            let reg = Arc::clone(&reg);
            let args = args();
            async move { reg.renew(XactKind::MakeNCopies, args).unwrap() }
        }
    );
    assert!(r1.is_new ^ r2.is_new, "exactly one renewal must be new");
    assert_eq!(r1.entry.base().uuid(), r2.entry.base().uuid());

    let listed = reg.list(&strata_xaction::XactFilter {
        kind: Some(XactKind::MakeNCopies),
        bck: Some(bck),
        running_only: false,
    });
    assert_eq!(listed.len(), 1);
    await_terminal(&r1.entry, 30).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_erase_converges_under_mountpath_churn() {
    let (_dir, mpaths, deps) = fixture(4);
    let reg = registry_with_mirror(&deps);
    let bck = Bck::new("b", Provider::Ais);

    // 40 objects, each with every possible copy (3 extras)
    for i in 0..40 {
        let mut lom = put_object(&mpaths, &bck, &format!("o{i}"), b"replicated payload");
        lom.fill(FillFlags::STAT, None).unwrap();
        for mp in mpaths.enabled() {
            if mp.label != lom.mpath.label {
                lom.add_copy(&mp, None).unwrap();
            }
        }
        assert_eq!(lom.copies.len(), 3);
    }

    let res = reg
        .renew(
            XactKind::EraseCopies,
            XactArgs::for_bck(bck.clone()).with_copies(2),
        )
        .unwrap();

    // yank a mountpath while the joggers are walking
    tokio::time::sleep(Duration::from_millis(5)).await;
    mpaths.remove("mp3").unwrap();

    await_terminal(&res.entry, 30).await;
    assert!(
        !res.entry.base().aborted(),
        "churn must restart joggers, not abort the xaction"
    );

    // every surviving primary converged to <= 2 replicas
    let mut checked = 0;
    for mp in mpaths.enabled() {
        let root = content::make_path_bck(&mp, ContentType::Object, &bck);
        for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || lmeta::is_sidecar(entry.path()) {
                continue;
            }
            let parsed = content::parse_fqn(&mp, entry.path()).unwrap();
            let mut lom = Lom::from_fqn(parsed, &mpaths).unwrap();
            lom.fill(FillFlags::STAT.union(FillFlags::COPIES), None).unwrap();
            if lom.is_primary() {
                assert!(
                    lom.copies.len() + 1 <= 2,
                    "{} still has {} replicas",
                    lom.uname(),
                    lom.copies.len() + 1
                );
                checked += 1;
            }
        }
    }
    assert!(checked > 0, "no primaries found after churn");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_put_copies_on_demand_lifecycle() {
    let (_dir, mpaths, deps) = fixture(2);
    let reg = registry_with_mirror(&deps);
    let bck = Bck::new("m2", Provider::Ais);

    let lom = put_object(&mpaths, &bck, "fresh", b"hot off the wire");

    let res = reg
        .renew(
            XactKind::PutCopies,
            XactArgs::for_bck(bck.clone()).with_copies(2),
        )
        .unwrap();
    let put: &XactPutCopies = res.entry.as_any().downcast_ref().unwrap();
    put.enqueue("fresh").unwrap();

    // the copy lands on the other mountpath
    let other = mpaths
        .enabled()
        .into_iter()
        .find(|mp| mp.label != lom.mpath.label)
        .unwrap();
    let copy_fqn = content::make_path_obj(&other, ContentType::Object, &bck, "fresh");
    tokio::time::timeout(Duration::from_secs(10), async {
        while !copy_fqn.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("put-copies never replicated the object");

    // pending drains, idle timeout (50ms) elapses, the sweep reaps it
    tokio::time::timeout(Duration::from_secs(10), async {
        while reg.abort_idle() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("idle put-copies was never reaped");
    assert!(res.entry.base().aborted());

    // a second abort is a no-op; the next renewal starts a fresh one
    assert!(!res.entry.base().abort());
    let renewed = reg
        .renew(
            XactKind::PutCopies,
            XactArgs::for_bck(bck.clone()).with_copies(2),
        )
        .unwrap();
    assert!(renewed.is_new);
    assert_ne!(renewed.entry.base().uuid(), res.entry.base().uuid());
}
