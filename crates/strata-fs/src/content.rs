//! Content types and canonical path construction
//!
//! Layout under each mountpath root:
//!
//! ```text
//! <root>/%ob/<provider>[/@<uuid>]/<bucket>/<object-path>   objects
//! <root>/%wk/<provider>[/@<uuid>]/<bucket>/<name>.<uuid>.wrk  workfiles
//! ```
//!
//! The `%`-prefixed segments cannot collide with bucket names (S3 names
//! never contain `%`), so an FQN parses back unambiguously.

use crate::mountpath::Mountpath;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use strata_common::{Bck, Provider};
use uuid::Uuid;

/// Workfile extension; finalized or unlinked, never served
pub const WORK_EXT: &str = "wrk";

/// On-disk content class of a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    Object,
    Workfile,
}

impl ContentType {
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Object => "%ob",
            Self::Workfile => "%wk",
        }
    }

    #[must_use]
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "%ob" => Some(Self::Object),
            "%wk" => Some(Self::Workfile),
            _ => None,
        }
    }
}

/// `<root>/<ct>/<provider>[/@uuid]/<bucket>`
#[must_use]
pub fn make_path_bck(mpath: &Mountpath, ct: ContentType, bck: &Bck) -> PathBuf {
    let mut path = mpath.path.join(ct.prefix()).join(bck.provider.as_str());
    if !bck.ns.uuid.is_empty() {
        path.push(format!("@{}", bck.ns.uuid));
    }
    path.push(&bck.name);
    path
}

/// `<root>/<ct>/<provider>[/@uuid]/<bucket>/<obj>`
#[must_use]
pub fn make_path_obj(mpath: &Mountpath, ct: ContentType, bck: &Bck, obj_name: &str) -> PathBuf {
    make_path_bck(mpath, ct, bck).join(obj_name)
}

/// A fresh, collision-free workfile FQN for `(bck, obj_name)`.
#[must_use]
pub fn gen_workfile_fqn(mpath: &Mountpath, bck: &Bck, obj_name: &str) -> PathBuf {
    let name = format!("{obj_name}.{}.{WORK_EXT}", Uuid::new_v4().simple());
    make_path_obj(mpath, ContentType::Workfile, bck, &name)
}

/// Crash-safe finalize: the workfile becomes visible at `dst` atomically.
pub fn finalize_workfile(work_fqn: &Path, dst_fqn: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst_fqn.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(work_fqn, dst_fqn)
}

/// An FQN decomposed back into its placement coordinates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFqn {
    pub mpath: Arc<Mountpath>,
    pub ct: ContentType,
    pub bck: Bck,
    pub obj_name: String,
}

/// Parse an FQN that lives under `mpath`. Returns `None` for paths that
/// do not follow the canonical layout.
#[must_use]
pub fn parse_fqn(mpath: &Arc<Mountpath>, fqn: &Path) -> Option<ParsedFqn> {
    let rel = fqn.strip_prefix(&mpath.path).ok()?;
    let mut comps = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str(),
            _ => None,
        });

    let ct = ContentType::from_prefix(comps.next()?)?;
    let provider = Provider::parse(comps.next()?).ok()?;

    let mut next = comps.next()?;
    let mut ns_uuid = String::new();
    if let Some(uuid) = next.strip_prefix('@') {
        ns_uuid = uuid.to_string();
        next = comps.next()?;
    }
    let bck = Bck {
        name: next.to_string(),
        provider,
        ns: strata_common::Namespace {
            uuid: ns_uuid,
            name: String::new(),
        },
    };

    let obj_name = comps.collect::<Vec<_>>().join("/");
    if obj_name.is_empty() {
        return None;
    }
    Some(ParsedFqn {
        mpath: Arc::clone(mpath),
        ct,
        bck,
        obj_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mountpath::MountpathSet;
    use tempfile::TempDir;

    fn one_mpath() -> (TempDir, Arc<Mountpath>) {
        let dir = TempDir::new().unwrap();
        let set = MountpathSet::new(vec![(dir.path().join("mp0"), "mp0".into())]).unwrap();
        let mp = set.get("mp0").unwrap();
        (dir, mp)
    }

    #[test]
    fn test_path_roundtrip() {
        let (_dir, mp) = one_mpath();
        let bck = Bck::new("imagenet", Provider::Aws);
        let fqn = make_path_obj(&mp, ContentType::Object, &bck, "train/batch-001.tar");
        let parsed = parse_fqn(&mp, &fqn).unwrap();
        assert_eq!(parsed.ct, ContentType::Object);
        assert_eq!(parsed.bck, bck);
        assert_eq!(parsed.obj_name, "train/batch-001.tar");
    }

    #[test]
    fn test_remote_bucket_path_has_uuid_segment() {
        let (_dir, mp) = one_mpath();
        let bck = Bck::remote("shared", "GhT4");
        let fqn = make_path_obj(&mp, ContentType::Object, &bck, "o");
        assert!(fqn.to_str().unwrap().contains("/@GhT4/"));
        let parsed = parse_fqn(&mp, &fqn).unwrap();
        assert_eq!(parsed.bck.ns.uuid, "GhT4");
    }

    #[test]
    fn test_workfile_unique_and_typed() {
        let (_dir, mp) = one_mpath();
        let bck = Bck::new("b", Provider::Ais);
        let w1 = gen_workfile_fqn(&mp, &bck, "obj");
        let w2 = gen_workfile_fqn(&mp, &bck, "obj");
        assert_ne!(w1, w2);
        assert_eq!(parse_fqn(&mp, &w1).unwrap().ct, ContentType::Workfile);
    }

    #[test]
    fn test_finalize_workfile() {
        let (_dir, mp) = one_mpath();
        let bck = Bck::new("b", Provider::Ais);
        let work = gen_workfile_fqn(&mp, &bck, "obj");
        std::fs::create_dir_all(work.parent().unwrap()).unwrap();
        std::fs::write(&work, b"payload").unwrap();

        let dst = make_path_obj(&mp, ContentType::Object, &bck, "obj");
        finalize_workfile(&work, &dst).unwrap();
        assert!(!work.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_parse_rejects_foreign_paths() {
        let (_dir, mp) = one_mpath();
        assert!(parse_fqn(&mp, Path::new("/somewhere/else")).is_none());
        assert!(parse_fqn(&mp, &mp.path.join("no-content-type/b/o")).is_none());
        // bucket dir without an object
        assert!(parse_fqn(&mp, &mp.path.join("%ob/ais/bucket")).is_none());
    }
}
