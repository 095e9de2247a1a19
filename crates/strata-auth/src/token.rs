//! Authorization tokens
//!
//! Tokens are HMAC-SHA256-signed JWTs minted by the auth server; the
//! engine verifies the signature, rejects any other algorithm, and
//! checks expiry and revocation itself.
//!
//! Permission checks walk, in priority order: admin role, the bucket
//! ACL, the cluster ACL, then the default-cluster ACL (empty cluster
//! ID). No matching rule denies.

use crate::acl::{BckAcl, CluAcl};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strata_common::{AccessAttrs, Bck, Error, Result};

/// Verified token claims
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "username")]
    pub user_id: String,
    pub expires: DateTime<Utc>,
    #[serde(default, rename = "clusters")]
    pub cluster_acls: Vec<CluAcl>,
    #[serde(default, rename = "buckets", skip_serializing_if = "Vec::is_empty")]
    pub bucket_acls: Vec<BckAcl>,
    #[serde(default, rename = "admin")]
    pub is_admin: bool,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let left = self.expires.signed_duration_since(Utc::now());
        if left.num_seconds() <= 0 {
            write!(f, "user {}, token expired", self.user_id)
        } else {
            write!(f, "user {}, token expires in {}s", self.user_id, left.num_seconds())
        }
    }
}

impl Token {
    fn acl_for_cluster(&self, cluster_id: &str) -> Option<AccessAttrs> {
        let mut default_acl = None;
        for acl in &self.cluster_acls {
            if acl.id == cluster_id {
                return Some(acl.access);
            }
            if acl.id.is_empty() {
                default_acl = Some(acl.access);
            }
        }
        default_acl
    }

    fn acl_for_bucket(&self, cluster_id: &str, bck: &Bck) -> Option<AccessAttrs> {
        self.bucket_acls.iter().find_map(|acl| {
            // foreign-cluster buckets carry the cluster in ns.uuid
            if acl.bck.ns.uuid != cluster_id {
                return None;
            }
            let mut stripped = acl.bck.clone();
            stripped.ns.uuid = String::new();
            (&stripped == bck).then_some(acl.access)
        })
    }

    /// Check `perms` against this token for `(cluster_id, bck)`.
    ///
    /// Rules, highest priority first: admin passes everything; bucket
    /// ACL overrides cluster ACL for object permissions; cluster-scoped
    /// permission bits require a cluster ID and the cluster ACL.
    pub fn check_permissions(
        &self,
        cluster_id: &str,
        bck: Option<&Bck>,
        perms: AccessAttrs,
    ) -> Result<()> {
        if self.is_admin {
            return Ok(());
        }
        if perms.is_empty() {
            return Err(Error::invalid_argument("empty permissions requested"));
        }
        let clu_perms = perms.intersect(AccessAttrs::CLUSTER);
        let obj_perms = perms.without(AccessAttrs::CLUSTER);
        let clu_acl = self.acl_for_cluster(cluster_id);

        if !clu_perms.is_empty() {
            if cluster_id.is_empty() {
                return Err(Error::invalid_argument(
                    "requested cluster permissions without cluster ID",
                ));
            }
            match clu_acl {
                Some(acl) if acl.has(clu_perms) => {}
                Some(acl) => {
                    return Err(Error::Permission(format!(
                        "cluster {cluster_id}, {self}, granted({})",
                        acl.describe()
                    )))
                }
                None => return Err(Error::Permission(format!("cluster {cluster_id}, {self}"))),
            }
        }
        if obj_perms.is_empty() {
            return Ok(());
        }

        let bck = bck.ok_or_else(|| {
            Error::invalid_argument("requested bucket permissions without a bucket")
        })?;
        if let Some(acl) = self.acl_for_bucket(cluster_id, bck) {
            return if acl.has(obj_perms) {
                Ok(())
            } else {
                Err(Error::Permission(format!(
                    "{self}, bucket {bck}, granted({})",
                    acl.describe()
                )))
            };
        }
        match clu_acl {
            Some(acl) if acl.has(obj_perms) => Ok(()),
            Some(acl) => Err(Error::Permission(format!(
                "{self}, granted({})",
                acl.describe()
            ))),
            None => Err(Error::Permission(format!("{self}, no ACL matches"))),
        }
    }
}

/// Verify and decode a token. Only HMAC-SHA256 is accepted; any other
/// signing algorithm yields `TokenInvalid`.
pub fn decrypt_token(token_str: &str, secret: &str) -> Result<Token> {
    let mut validation = Validation::new(Algorithm::HS256);
    // expiry lives in the `expires` claim, checked below
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let data = jsonwebtoken::decode::<Token>(
        token_str,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "token verification failed");
        Error::TokenInvalid
    })?;
    let token = data.claims;
    if token.expires <= Utc::now() {
        return Err(Error::TokenExpired);
    }
    Ok(token)
}

/// Mint a token; used by tests and control tooling (the auth server is
/// the production issuer).
pub fn encrypt_token(token: &Token, secret: &str) -> Result<String> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        token,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::internal(format!("token encoding failed: {e}")))
}

/// Revoked-token set; entries expire out when their token would have.
#[derive(Default)]
pub struct TokenList {
    revoked: RwLock<HashSet<String>>,
}

impl TokenList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token_str: &str) {
        self.revoked.write().insert(token_str.to_string());
    }

    #[must_use]
    pub fn is_revoked(&self, token_str: &str) -> bool {
        self.revoked.read().contains(token_str)
    }

    /// Verify a token and reject revoked ones.
    pub fn validate(&self, token_str: &str, secret: &str) -> Result<Token> {
        if self.is_revoked(token_str) {
            return Err(Error::TokenRevoked);
        }
        decrypt_token(token_str, secret)
    }

    /// Drop revocation records for tokens that are expired anyway.
    pub fn prune(&self, secret: &str) {
        self.revoked
            .write()
            .retain(|t| matches!(decrypt_token(t, secret), Ok(_)));
    }
}
