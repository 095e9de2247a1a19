//! Cluster and bucket ACLs

use serde::{Deserialize, Serialize};
use strata_common::{AccessAttrs, Bck};

/// Cluster-wide permissions; an empty `id` is the default entry applied
/// when no specific cluster matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CluAcl {
    #[serde(default)]
    pub id: String,
    pub access: AccessAttrs,
}

/// Per-bucket permissions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BckAcl {
    pub bck: Bck,
    pub access: AccessAttrs,
}

/// Merge `new` bucket ACLs into `old`: look up by bucket, update the
/// access bits of a match, append the rest.
#[must_use]
pub fn merge_bck_acls(mut old: Vec<BckAcl>, new: &[BckAcl]) -> Vec<BckAcl> {
    for n in new {
        match old.iter_mut().find(|o| o.bck == n.bck) {
            Some(o) => o.access = n.access,
            None => old.push(n.clone()),
        }
    }
    old
}

/// Merge `new` cluster ACLs into `old`: update by cluster ID or append.
#[must_use]
pub fn merge_cluster_acls(mut old: Vec<CluAcl>, new: &[CluAcl]) -> Vec<CluAcl> {
    for n in new {
        match old.iter_mut().find(|o| o.id == n.id) {
            Some(o) => o.access = n.access,
            None => old.push(n.clone()),
        }
    }
    old
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::Provider;

    fn bacl(name: &str, access: AccessAttrs) -> BckAcl {
        BckAcl {
            bck: Bck::new(name, Provider::Ais),
            access,
        }
    }

    #[test]
    fn test_merge_bck_updates_existing() {
        let old = vec![bacl("b1", AccessAttrs::RO), bacl("b2", AccessAttrs::RW)];
        let merged = merge_bck_acls(old, &[bacl("b1", AccessAttrs::RW)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].access, AccessAttrs::RW);
    }

    #[test]
    fn test_merge_bck_appends_unseen() {
        // an ACL for a bucket absent from `old` must be appended, even
        // when `old` is non-empty
        let old = vec![bacl("b1", AccessAttrs::RO)];
        let merged = merge_bck_acls(old, &[bacl("b9", AccessAttrs::RW)]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|a| a.bck.name == "b9" && a.access == AccessAttrs::RW));
    }

    #[test]
    fn test_merge_bck_into_empty() {
        let merged = merge_bck_acls(Vec::new(), &[bacl("b1", AccessAttrs::RO)]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_cluster_acls() {
        let old = vec![CluAcl {
            id: "C1".into(),
            access: AccessAttrs::RO,
        }];
        let merged = merge_cluster_acls(
            old,
            &[
                CluAcl {
                    id: "C1".into(),
                    access: AccessAttrs::RW,
                },
                CluAcl {
                    id: "C2".into(),
                    access: AccessAttrs::RO,
                },
            ],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].access, AccessAttrs::RW);
    }
}
