//! HRW (Highest Random Weight) selection
//!
//! `score(node) = xxh64(key, seed = xxh64(node_id)) * weight`; the highest
//! score wins. Ties go to the lexicographically smaller node ID so the
//! winner is total-ordered for any fixed input set.

use crate::smap::{Smap, Snode};
use xxhash_rust::xxh64::xxh64;

#[inline]
fn node_seed(id: &str) -> u64 {
    xxh64(id.as_bytes(), 0)
}

#[inline]
fn score(id: &str, weight: u64, uname: &str) -> u64 {
    xxh64(uname.as_bytes(), node_seed(id)).wrapping_mul(weight.max(1))
}

/// The one target that owns `uname` under the given cluster map.
/// `None` iff the map has no targets.
#[must_use]
pub fn hrw_target<'a>(smap: &'a Smap, uname: &str) -> Option<&'a Snode> {
    let mut winner: Option<(&Snode, u64)> = None;
    // BTreeMap iterates in id order, so strict '>' keeps the smaller id on ties
    for node in smap.targets.values() {
        let s = score(&node.id, node.weight, uname);
        match winner {
            Some((_, best)) if s <= best => {}
            _ => winner = Some((node, s)),
        }
    }
    winner.map(|(node, _)| node)
}

/// HRW over arbitrary named items (equal weight); used for mountpaths.
/// `ids` must be sorted by the caller for deterministic tie-breaks.
#[must_use]
pub fn hrw_named<'a>(ids: &[&'a str], uname: &str) -> Option<&'a str> {
    hrw_mountpath_idx(ids, uname).map(|i| ids[i])
}

/// Index form of [`hrw_named`]
#[must_use]
pub fn hrw_mountpath_idx(ids: &[&str], uname: &str) -> Option<usize> {
    let mut winner: Option<(usize, u64)> = None;
    for (i, id) in ids.iter().enumerate() {
        let s = score(id, 1, uname);
        match winner {
            Some((wi, best)) if s < best || (s == best && ids[wi] <= *id) => {}
            _ => winner = Some((i, s)),
        }
    }
    winner.map(|(i, _)| i)
}

/// Plan `n` copy locations: the top-`n` distinct ids by HRW score with the
/// primary excluded. Returns fewer than `n` when not enough ids exist; the
/// caller logs the truncation.
#[must_use]
pub fn hrw_copies(ids: &[&str], uname: &str, n: usize, exclude: &[usize]) -> Vec<usize> {
    let mut scored: Vec<(usize, u64)> = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| !exclude.contains(i))
        .map(|(i, id)| (i, score(id, 1, uname)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| ids[a.0].cmp(ids[b.0])));
    scored.truncate(n);
    scored.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smap::{Smap, Snode};
    use std::collections::HashMap;

    fn smap_of(ids: &[&str]) -> Smap {
        let mut smap = Smap::new(1);
        for id in ids {
            smap.insert(Snode::new(*id));
        }
        smap
    }

    #[test]
    fn test_deterministic() {
        let smap = smap_of(&["t[a]", "t[b]", "t[c]", "t[d]"]);
        for key in ["b/o1", "b/o2", "aws/b/deep/nested/obj"] {
            let first = hrw_target(&smap, key).unwrap().id.clone();
            for _ in 0..10 {
                assert_eq!(hrw_target(&smap, key).unwrap().id, first);
            }
        }
    }

    #[test]
    fn test_permutation_invariant() {
        // BTreeMap normalizes insertion order, but exercise it anyway
        let mut a = Smap::new(1);
        let mut b = Smap::new(1);
        for id in ["t[x]", "t[y]", "t[z]"] {
            a.insert(Snode::new(id));
        }
        for id in ["t[z]", "t[x]", "t[y]"] {
            b.insert(Snode::new(id));
        }
        for i in 0..100 {
            let key = format!("bck/obj-{i}");
            assert_eq!(
                hrw_target(&a, &key).unwrap().id,
                hrw_target(&b, &key).unwrap().id
            );
        }
    }

    #[test]
    fn test_minimal_reshuffle_on_join() {
        let before = smap_of(&["t[a]", "t[b]", "t[c]", "t[d]"]);
        let mut after = before.clone();
        after.version = 2;
        after.insert(Snode::new("t[e]"));

        let total = 10_000;
        let mut moved = 0;
        for i in 0..total {
            let key = format!("bck/obj-{i}");
            let old = &hrw_target(&before, &key).unwrap().id;
            let new = &hrw_target(&after, &key).unwrap().id;
            if old != new {
                // keys only ever move TO the new target
                assert_eq!(new.as_str(), "t[e]");
                moved += 1;
            }
        }
        // expect ~1/5 of keys to move; allow generous slack
        let expected = total / 5;
        assert!(
            moved > expected / 2 && moved < expected * 2,
            "moved {moved} of {total}, expected ~{expected}"
        );
    }

    #[test]
    fn test_weighted_balance() {
        let mut smap = Smap::new(1);
        smap.insert(Snode::with_weight("t[big]", 3));
        smap.insert(Snode::with_weight("t[small]", 1));
        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..4000 {
            let key = format!("b/o{i}");
            *counts
                .entry(hrw_target(&smap, &key).unwrap().id.clone())
                .or_default() += 1;
        }
        let big = counts["t[big]"];
        let small = counts["t[small]"];
        assert!(big > small, "weighted node got fewer keys: {big} vs {small}");
    }

    #[test]
    fn test_mountpath_selection_and_copies() {
        let mpaths = ["/data/1", "/data/2", "/data/3"];
        let primary = hrw_mountpath_idx(&mpaths, "m1/o").unwrap();
        let copies = hrw_copies(&mpaths, "m1/o", 1, &[primary]);
        assert_eq!(copies.len(), 1);
        assert_ne!(copies[0], primary);

        // copy plan truncates when not enough mountpaths exist
        let many = hrw_copies(&mpaths, "m1/o", 5, &[primary]);
        assert_eq!(many.len(), 2);
        let mut all = many.clone();
        all.push(primary);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 3, "copy plan reused a mountpath");
    }

    #[test]
    fn test_empty_inputs() {
        let smap = Smap::new(1);
        assert!(hrw_target(&smap, "k").is_none());
        assert!(hrw_mountpath_idx(&[], "k").is_none());
        assert!(hrw_copies(&[], "k", 2, &[]).is_empty());
    }
}
