//! GFN - Get-From-Neighbor resolution
//!
//! A read can land on a target that is not the HRW owner for the key:
//! during rebalance the bytes may still (or already) be here. Outside a
//! GFN window the target redirects to the owner; inside it, a target that
//! physically holds the object serves it and marks it misplaced for the
//! rebalancer.

use strata_placement::{hrw_target, Smap};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfnDecision {
    /// This target is the HRW owner; serve normally.
    Owned,
    /// Not the owner; redirect the caller to the owner target.
    Redirect(String),
    /// Not the owner but the bytes are local and the request allows GFN:
    /// serve, and mark the object misplaced.
    ServeMisplaced,
}

/// Decide how to serve a read for `uname` on target `self_id`.
/// `present` is whether the object physically exists on this target.
pub fn resolve_gfn(
    smap: &Smap,
    self_id: &str,
    uname: &str,
    is_gfn: bool,
    present: bool,
) -> GfnDecision {
    let owner = match hrw_target(smap, uname) {
        Some(node) => node,
        None => return GfnDecision::Owned, // degenerate map; serve locally
    };
    if owner.id == self_id {
        return GfnDecision::Owned;
    }
    if is_gfn && present {
        tracing::debug!(%uname, owner = %owner.id, "serving misplaced object (GFN)");
        return GfnDecision::ServeMisplaced;
    }
    GfnDecision::Redirect(owner.id.clone())
}
