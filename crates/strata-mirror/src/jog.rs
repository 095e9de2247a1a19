//! Shared jogger plumbing for the mirror walkers

use crate::MirrorDeps;
use std::path::PathBuf;
use std::sync::Arc;
use strata_common::{Bck, Error, Result};
use strata_core::Lom;
use strata_fs::content::{self, ContentType};
use strata_fs::lmeta;
use strata_fs::mountpath::Mountpath;
use tokio::sync::watch;
use walkdir::WalkDir;

/// Regular object files under the bucket's object root on one mountpath,
/// with lmeta sidecars filtered out.
pub(crate) fn object_files(mpath: &Mountpath, bck: &Bck) -> Vec<PathBuf> {
    let root = content::make_path_bck(mpath, ContentType::Object, bck);
    if !root.exists() {
        return Vec::new();
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !lmeta::is_sidecar(p))
        .collect()
}

/// Abort/stop probe; checked once per file (the walk's yield point).
pub(crate) fn stopped(stop: &watch::Receiver<bool>, aborted: bool) -> bool {
    *stop.borrow() || aborted
}

/// Pick the next copy destination for `lom`: HRW over enabled mountpaths
/// excluding the primary and every existing copy. `None` when the
/// mountpath set is exhausted (the plan truncates, not fails).
pub(crate) fn next_copy_target(deps: &MirrorDeps, lom: &Lom) -> Option<Arc<Mountpath>> {
    let enabled = deps.mpaths.enabled();
    let labels: Vec<&str> = enabled.iter().map(|mp| mp.label.as_str()).collect();
    let mut exclude: Vec<usize> = Vec::with_capacity(lom.copies.len() + 1);
    for (i, mp) in enabled.iter().enumerate() {
        let holds_replica = mp.label == lom.mpath.label
            || lom.copies.iter().any(|c| c.starts_with(&mp.path));
        if holds_replica {
            exclude.push(i);
        }
    }
    let picked = strata_placement::hrw_copies(&labels, &lom.uname(), 1, &exclude);
    picked.first().map(|&i| Arc::clone(&enabled[i]))
}

/// Materialize a primary LOM for a walked file; `Ok(None)` for entries
/// the mirror walkers skip (copies, misplaced, vanished).
pub(crate) fn load_primary(deps: &MirrorDeps, mpath: &Arc<Mountpath>, fqn: &PathBuf) -> Result<Option<Lom>> {
    use strata_core::FillFlags;
    let parsed = match content::parse_fqn(mpath, fqn) {
        Some(parsed) if parsed.ct == ContentType::Object => parsed,
        _ => return Ok(None),
    };
    let mut lom = Lom::from_fqn(parsed, &deps.mpaths)?;
    lom.fill(FillFlags::STAT.union(FillFlags::COPIES), Some(&deps.cache))?;
    if lom.does_not_exist || !lom.is_primary() {
        // copies converge through their primary; misplaced is rebalance's job
        if lom.is_misplaced() {
            tracing::debug!(%lom, "skipping misplaced object");
        }
        return Ok(None);
    }
    Ok(Some(lom))
}

/// Map worker errors: abort-kind errors terminate the jog quietly.
pub(crate) fn jog_result(res: Result<u64>, what: &str) -> u64 {
    match res {
        Ok(n) => n,
        Err(Error::Aborted(_)) => 0,
        Err(e) => {
            tracing::error!(what, error = %e, "jogger failed");
            0
        }
    }
}
