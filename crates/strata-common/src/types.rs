//! Core type definitions for strata
//!
//! Buckets, providers, namespaces, bucket properties, and access bits.
//! A bucket is identified by `(provider, namespace, name)`; two buckets
//! are equal iff all three components match.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend provider of a bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Native buckets owned by this cluster
    #[default]
    Ais,
    /// Amazon S3
    Aws,
    /// Google Cloud Storage
    Gcp,
    /// Azure Blob Storage
    Azure,
    /// Bucket owned by a remote peer cluster
    Remote,
    /// Plain HTTP(S) origin
    Http,
}

impl Provider {
    /// Parse the wire form (`ais`, `aws`, `gcp`, `azure`, `remote`, `ht`)
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "ais" | "" => Ok(Self::Ais),
            "aws" | "s3" => Ok(Self::Aws),
            "gcp" | "gs" => Ok(Self::Gcp),
            "azure" | "az" => Ok(Self::Azure),
            "remote" => Ok(Self::Remote),
            "ht" | "http" => Ok(Self::Http),
            other => Err(format!("invalid provider {other:?}")),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ais => "ais",
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::Remote => "remote",
            Self::Http => "ht",
        }
    }

    /// Cloud backends are re-fetchable and therefore cheaper to evict.
    #[must_use]
    pub const fn is_cloud(&self) -> bool {
        matches!(self, Self::Aws | Self::Gcp | Self::Azure)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket namespace; `uuid` identifies a remote cluster when non-empty
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Namespace {
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.uuid.is_empty() && self.name.is_empty()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uuid.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "@{}#{}", self.uuid, self.name)
        }
    }
}

/// Bucket identity: `(provider, namespace, name)`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bck {
    pub name: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Namespace::is_global")]
    pub ns: Namespace,
}

impl Bck {
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            name: name.into(),
            provider,
            ns: Namespace::global(),
        }
    }

    /// Bucket from a foreign cluster identified by `uuid`
    pub fn remote(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: Provider::Remote,
            ns: Namespace {
                uuid: uuid.into(),
                name: String::new(),
            },
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.provider != Provider::Ais || !self.ns.uuid.is_empty()
    }

    #[must_use]
    pub fn is_cloud(&self) -> bool {
        self.provider.is_cloud()
    }

    /// Canonical unique name of the bucket itself
    #[must_use]
    pub fn buname(&self) -> String {
        if self.ns.is_global() {
            format!("{}/{}", self.provider, self.name)
        } else {
            format!("{}/{}/{}", self.provider, self.ns, self.name)
        }
    }

    /// Canonical unique name of an object in this bucket; the key used by
    /// the name-locker, the LOM cache, and HRW placement.
    #[must_use]
    pub fn uname(&self, obj_name: &str) -> String {
        format!("{}/{}", self.buname(), obj_name)
    }
}

impl fmt::Display for Bck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buname())
    }
}

/// Access permission bit-set carried by bucket properties and ACLs
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(transparent)]
#[display("{_0:#x}")]
pub struct AccessAttrs(pub u64);

impl AccessAttrs {
    pub const GET: Self = Self(1 << 0);
    pub const OBJ_HEAD: Self = Self(1 << 1);
    pub const PUT: Self = Self(1 << 2);
    pub const OBJ_DELETE: Self = Self(1 << 3);
    pub const OBJ_MOVE: Self = Self(1 << 4);
    pub const BCK_HEAD: Self = Self(1 << 5);
    pub const OBJ_LIST: Self = Self(1 << 6);
    pub const PATCH: Self = Self(1 << 7);
    pub const BCK_SET_ACL: Self = Self(1 << 8);
    pub const LIST_BUCKETS: Self = Self(1 << 9);
    pub const SHOW_CLUSTER: Self = Self(1 << 10);
    pub const CREATE_BUCKET: Self = Self(1 << 11);
    pub const DESTROY_BUCKET: Self = Self(1 << 12);
    pub const MOVE_BUCKET: Self = Self(1 << 13);
    pub const ADMIN: Self = Self(1 << 14);

    pub const NONE: Self = Self(0);

    /// Read-only object access
    pub const RO: Self = Self(Self::GET.0 | Self::OBJ_HEAD.0 | Self::OBJ_LIST.0 | Self::BCK_HEAD.0);

    /// Read-write object access
    pub const RW: Self =
        Self(Self::RO.0 | Self::PUT.0 | Self::OBJ_DELETE.0 | Self::OBJ_MOVE.0 | Self::PATCH.0);

    /// Cluster-scoped bits (require a cluster ID on permission checks)
    pub const CLUSTER: Self = Self(
        Self::LIST_BUCKETS.0
            | Self::SHOW_CLUSTER.0
            | Self::CREATE_BUCKET.0
            | Self::DESTROY_BUCKET.0
            | Self::MOVE_BUCKET.0
            | Self::ADMIN.0,
    );

    #[must_use]
    pub const fn has(&self, perms: Self) -> bool {
        self.0 & perms.0 == perms.0
    }

    #[must_use]
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersect(&self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn without(&self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Human form for log lines
    #[must_use]
    pub fn describe(&self) -> String {
        const NAMES: &[(AccessAttrs, &str)] = &[
            (AccessAttrs::GET, "GET"),
            (AccessAttrs::OBJ_HEAD, "HEAD-OBJECT"),
            (AccessAttrs::PUT, "PUT"),
            (AccessAttrs::OBJ_DELETE, "DELETE-OBJECT"),
            (AccessAttrs::OBJ_MOVE, "MOVE-OBJECT"),
            (AccessAttrs::BCK_HEAD, "HEAD-BUCKET"),
            (AccessAttrs::OBJ_LIST, "LIST-OBJECTS"),
            (AccessAttrs::PATCH, "PATCH"),
            (AccessAttrs::BCK_SET_ACL, "SET-BUCKET-ACL"),
            (AccessAttrs::LIST_BUCKETS, "LIST-BUCKETS"),
            (AccessAttrs::SHOW_CLUSTER, "SHOW-CLUSTER"),
            (AccessAttrs::CREATE_BUCKET, "CREATE-BUCKET"),
            (AccessAttrs::DESTROY_BUCKET, "DESTROY-BUCKET"),
            (AccessAttrs::MOVE_BUCKET, "MOVE-BUCKET"),
            (AccessAttrs::ADMIN, "ADMIN"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "NONE".to_string()
        } else {
            names.join(",")
        }
    }
}

/// Mirror (n-way local replication) configuration of a bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorProps {
    pub enabled: bool,
    /// Total number of copies including the primary; >= 1
    pub copies: u32,
    /// Put-copies queue depth before requests are dropped with a warning
    #[serde(default = "default_mirror_burst")]
    pub burst: usize,
}

fn default_mirror_burst() -> usize {
    512
}

impl Default for MirrorProps {
    fn default() -> Self {
        Self {
            enabled: false,
            copies: 1,
            burst: default_mirror_burst(),
        }
    }
}

/// Erasure-coding configuration of a bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcProps {
    pub enabled: bool,
    pub data_slices: u8,
    pub parity_slices: u8,
}

/// Object versioning configuration of a bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningProps {
    pub enabled: bool,
}

/// Bucket properties
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketProps {
    #[serde(default)]
    pub mirror: MirrorProps,
    #[serde(default)]
    pub ec: EcProps,
    #[serde(default)]
    pub checksum: crate::checksum::ChecksumType,
    #[serde(default)]
    pub versioning: VersioningProps,
    #[serde(default = "default_access")]
    pub access: AccessAttrs,
}

fn default_access() -> AccessAttrs {
    AccessAttrs::RW
}

impl BucketProps {
    pub fn validate(&self) -> Result<(), String> {
        if self.mirror.copies < 1 {
            return Err(format!(
                "invalid mirror.copies {} (must be >= 1)",
                self.mirror.copies
            ));
        }
        if self.ec.enabled && (self.ec.data_slices == 0 || self.ec.parity_slices == 0) {
            return Err(format!(
                "invalid EC config {}d/{}p (slice counts must be > 0)",
                self.ec.data_slices, self.ec.parity_slices
            ));
        }
        Ok(())
    }
}
