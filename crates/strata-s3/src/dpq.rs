//! Datapath query (dpq)
//!
//! Parses the handful of query parameters the datapath cares about with
//! a single scan over the raw query string. This is a faster, narrower
//! alternative to a full RFC-compliant query parse; anything outside the
//! recognized set is an error in debug builds and ignored in release.

use strata_common::{Error, Result};

pub const QPARAM_PROVIDER: &str = "provider";
pub const QPARAM_NAMESPACE: &str = "namespace";
pub const QPARAM_SKIP_VC: &str = "skip-vc";
pub const QPARAM_UNIX_TIME: &str = "unix-time";
pub const QPARAM_UUID: &str = "uuid";
pub const QPARAM_ARCHPATH: &str = "archpath";
pub const QPARAM_ARCHMIME: &str = "archmime";
pub const QPARAM_IS_GFN: &str = "is-gfn";
pub const QPARAM_ORIG_URL: &str = "orig-url";
pub const QPARAM_APPEND_TYPE: &str = "append-type";
pub const QPARAM_APPEND_HANDLE: &str = "append-handle";
pub const QPARAM_OWT: &str = "owt";
pub const QPARAM_FLT_PRESENCE: &str = "flt-presence";
pub const QPARAM_DONT_ADD_REMOTE: &str = "dont-add-remote";
pub const QPARAM_BINFO: &str = "binfo";
pub const QPARAM_ETL_NAME: &str = "etl-name";
pub const QPARAM_SILENT: &str = "silent";
pub const QPARAM_LATEST_VER: &str = "latest-ver";

/// Datapath query parameters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dpq {
    // bucket
    pub provider: String,
    pub namespace: String,
    // archive member addressing
    pub archpath: String,
    pub archmime: String,
    // append transaction
    pub append_type: String,
    pub append_handle: String,
    // strings
    pub ptime: String,
    pub uuid: String,
    pub orig_url: String,
    pub owt: String,
    pub flt_presence: String,
    pub binfo: String,
    pub etl_name: String,
    // booleans
    pub skip_vc: bool,
    pub is_gfn: bool,
    pub dont_add_remote: bool,
    pub silent: bool,
    pub latest_ver: bool,
}

impl Dpq {
    /// Reset for reuse between requests.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Parse `rawQuery` (everything after `?`), overwriting fields in
    /// place.
    pub fn parse(&mut self, raw_query: &str) -> Result<()> {
        let mut query = raw_query;
        while !query.is_empty() {
            let pair;
            match query.find('&') {
                Some(i) => {
                    pair = &query[..i];
                    query = &query[i + 1..];
                }
                None => {
                    pair = query;
                    query = "";
                }
            }
            let (key, value) = match pair.find('=') {
                Some(i) if i > 0 => (&pair[..i], &pair[i + 1..]),
                _ => (pair, ""),
            };
            match key {
                QPARAM_PROVIDER => self.provider = value.to_string(),
                QPARAM_NAMESPACE => self.namespace = query_unescape(value)?,
                QPARAM_SKIP_VC => self.skip_vc = parse_bool(value),
                QPARAM_UNIX_TIME => self.ptime = value.to_string(),
                QPARAM_UUID => self.uuid = value.to_string(),
                QPARAM_ARCHPATH => self.archpath = query_unescape(value)?,
                QPARAM_ARCHMIME => self.archmime = query_unescape(value)?,
                QPARAM_IS_GFN => self.is_gfn = parse_bool(value),
                QPARAM_ORIG_URL => self.orig_url = query_unescape(value)?,
                QPARAM_APPEND_TYPE => self.append_type = value.to_string(),
                QPARAM_APPEND_HANDLE => self.append_handle = query_unescape(value)?,
                QPARAM_OWT => self.owt = value.to_string(),
                QPARAM_FLT_PRESENCE => self.flt_presence = value.to_string(),
                QPARAM_DONT_ADD_REMOTE => self.dont_add_remote = parse_bool(value),
                QPARAM_BINFO => self.binfo = value.to_string(),
                QPARAM_ETL_NAME => self.etl_name = value.to_string(),
                QPARAM_SILENT => self.silent = parse_bool(value),
                QPARAM_LATEST_VER => self.latest_ver = parse_bool(value),
                unknown => {
                    if cfg!(debug_assertions) {
                        return Err(Error::invalid_argument(format!(
                            "failed to fast-parse [{raw_query}], unknown key: {unknown:?}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s, "true" | "TRUE" | "True" | "1" | "yes" | "on" | "")
}

/// Percent-decode a query value; `+` decodes to space.
fn query_unescape(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16));
                let lo = bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "invalid URL escape in {s:?}"
                        )))
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| Error::invalid_argument(format!("invalid UTF-8 in {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typical_get() {
        let mut dpq = Dpq::default();
        dpq.parse("provider=aws&namespace=%40Gh7&unix-time=1700000123&uuid=x42&is-gfn=true")
            .unwrap();
        assert_eq!(dpq.provider, "aws");
        assert_eq!(dpq.namespace, "@Gh7");
        assert_eq!(dpq.ptime, "1700000123");
        assert_eq!(dpq.uuid, "x42");
        assert!(dpq.is_gfn);
        assert!(!dpq.silent);
    }

    #[test]
    fn test_parse_escaped_values() {
        let mut dpq = Dpq::default();
        dpq.parse("archpath=dir%2Fimg+001.jpg&orig-url=http%3A%2F%2Forigin%2Fo")
            .unwrap();
        assert_eq!(dpq.archpath, "dir/img 001.jpg");
        assert_eq!(dpq.orig_url, "http://origin/o");
    }

    #[test]
    fn test_booleans_and_flags() {
        let mut dpq = Dpq::default();
        dpq.parse("skip-vc=1&silent=true&latest-ver=on&dont-add-remote=false")
            .unwrap();
        assert!(dpq.skip_vc);
        assert!(dpq.silent);
        assert!(dpq.latest_ver);
        assert!(!dpq.dont_add_remote);
    }

    #[test]
    fn test_unknown_key_policy() {
        let mut dpq = Dpq::default();
        let res = dpq.parse("provider=ais&no-such-key=1");
        if cfg!(debug_assertions) {
            assert!(res.is_err());
        } else {
            assert!(res.is_ok());
            assert_eq!(dpq.provider, "ais");
        }
    }

    #[test]
    fn test_bad_escape_is_an_error() {
        let mut dpq = Dpq::default();
        assert!(dpq.parse("namespace=%zz").is_err());
    }

    #[test]
    fn test_clear_for_reuse() {
        let mut dpq = Dpq::default();
        dpq.parse("uuid=abc&silent=true").unwrap();
        dpq.clear();
        assert_eq!(dpq, Dpq::default());
    }
}
