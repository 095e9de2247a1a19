//! Bucket inventory
//!
//! S3-backed buckets can be listed from the bucket's inventory: a
//! gzipped CSV the upstream publishes periodically. The engine caches
//! the decompressed CSV locally (workfile + rename), reuses it across
//! pagination calls while its mtime stays within a small tolerance of
//! the upstream copy, and serves pages by scanning from a remembered
//! byte offset.
//!
//! One bucket, one inventory, one statically defined CSV.

use flate2::read::GzDecoder;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use strata_common::{Error, Result};
use strata_fs::content::finalize_workfile;
use strata_fs::fsutil;

pub const INV_NAME: &str = ".inventory";
pub const INV_SRC_EXT: &str = ".csv.gz";
pub const INV_DST_EXT: &str = ".csv";

/// Allowed mtime difference between the cached CSV and the upstream one
const MTIME_TOLERANCE: Duration = Duration::from_secs(4);

/// Largest page a single call will return
pub const INV_MAX_PAGE: usize = 8 * 1000;

const MANIFEST_SCHEMA_KEY: &str = "fileSchema";

/// Recognized inventory columns; anything else is carried as `Other`
/// and ignored (the position still counts).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvField {
    Bucket,
    Key,
    Size,
    ETag,
    LastModifiedDate,
    Other,
}

impl InvField {
    fn parse(s: &str) -> Self {
        match s {
            "Bucket" => Self::Bucket,
            "Key" => Self::Key,
            "Size" => Self::Size,
            "ETag" => Self::ETag,
            "LastModifiedDate" => Self::LastModifiedDate,
            _ => Self::Other,
        }
    }
}

/// Parsed and validated `fileSchema`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvSchema(pub Vec<InvField>);

impl InvSchema {
    /// Extract and validate the schema from the manifest body, e.g.
    /// `"fileSchema" : "Bucket, Key, Size, ETag"`. `Bucket` and `Key`
    /// must be the first two columns.
    pub fn from_manifest(manifest: &str) -> Result<Self> {
        let mut file_schema = None;
        for line in manifest.lines() {
            let Some((key_part, value_part)) = line.split_once(':') else {
                continue;
            };
            if !key_part.contains(MANIFEST_SCHEMA_KEY) {
                continue;
            }
            let value = value_part.trim().trim_end_matches(',');
            file_schema = Some(unquote(value).to_string());
            break;
        }
        let file_schema = file_schema.ok_or_else(|| {
            Error::invalid_argument(format!("manifest has no {MANIFEST_SCHEMA_KEY:?}"))
        })?;

        let fields: Vec<InvField> = file_schema.split(", ").map(InvField::parse).collect();
        if fields.len() < 2 || fields[0] != InvField::Bucket || fields[1] != InvField::Key {
            return Err(Error::invalid_argument(format!(
                "unexpected schema {file_schema:?}: expecting Bucket followed by Key"
            )));
        }
        Ok(Self(fields))
    }
}

/// Whether the cached CSV at `cached_fqn` can keep serving pages for an
/// upstream copy modified at `latest_ns`. A few seconds of skew between
/// the stored mtime and the upstream listing is tolerated.
#[must_use]
pub fn is_usable(cached_fqn: &Path, latest_ns: i64) -> bool {
    let Ok(meta) = std::fs::metadata(cached_fqn) else {
        return false;
    };
    let cached_ns = fsutil::mtime_ns(&meta);
    let diff_ns = (cached_ns - latest_ns).unsigned_abs();
    diff_ns < MTIME_TOLERANCE.as_nanos() as u64
}

/// Refresh the local cache: gunzip `src` into a workfile, rename it over
/// `dst_fqn`, and stamp it with the upstream mtime. Returns the
/// decompressed size. The workfile is removed on failure.
pub fn refresh_from_gz(src: impl Read, work_fqn: &Path, dst_fqn: &Path, mtime_ns: i64) -> Result<u64> {
    if let Some(parent) = work_fqn.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let result = (|| -> Result<u64> {
        let mut gz = GzDecoder::new(src);
        let mut out = std::fs::File::create(work_fqn)?;
        let size = std::io::copy(&mut gz, &mut out)?;
        drop(out);
        finalize_workfile(work_fqn, dst_fqn)?;
        fsutil::set_times_ns(dst_fqn, mtime_ns)?;
        Ok(size)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(work_fqn);
    }
    result
}

/// Listing request
#[derive(Clone, Debug, Default)]
pub struct LsoMsg {
    pub prefix: String,
    pub continuation_token: Option<String>,
    pub page_size: usize,
}

/// One listed object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LsoEntry {
    pub name: String,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// One page of a listing
#[derive(Clone, Debug, Default)]
pub struct LsoPage {
    pub entries: Vec<LsoEntry>,
    pub continuation_token: Option<String>,
}

/// Pagination state kept across calls for one listing
#[derive(Debug)]
pub struct InvCtx {
    pub schema: InvSchema,
    /// Byte offset of the next unread line in the cached CSV
    pub offset: u64,
}

impl InvCtx {
    #[must_use]
    pub fn new(schema: InvSchema) -> Self {
        Self { schema, offset: 0 }
    }

    /// Read the next page from the cached CSV. Resumes from the stored
    /// offset; the continuation token (last returned name) is skipped
    /// through defensively in case the offset landed early.
    pub fn list_page(&mut self, file: &mut std::fs::File, msg: &LsoMsg) -> Result<LsoPage> {
        let page_size = msg.page_size.clamp(1, INV_MAX_PAGE);
        file.seek(SeekFrom::Start(self.offset))?;
        let mut reader = BufReader::new(file);
        let mut page = LsoPage::default();
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break; // EOF: listing complete
            }
            self.offset += n as u64;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            let Some(entry) = self.parse_line(trimmed)? else {
                continue;
            };
            if !msg.prefix.is_empty() && !entry.name.starts_with(&msg.prefix) {
                continue;
            }
            // inventories are sorted by key; names at or before the token
            // were already returned (covers an offset that landed early)
            if let Some(token) = msg.continuation_token.as_deref() {
                if entry.name.as_str() <= token {
                    continue;
                }
            }
            page.entries.push(entry);
            if page.entries.len() >= page_size {
                page.continuation_token = page.entries.last().map(|e| e.name.clone());
                break;
            }
        }
        Ok(page)
    }

    fn parse_line(&self, line: &str) -> Result<Option<LsoEntry>> {
        let fields: Vec<&str> = line.split(',').map(unquote).collect();
        if fields.len() < 2 {
            return Ok(None);
        }
        let mut entry = LsoEntry {
            name: fields[1].to_string(),
            ..Default::default()
        };
        for (i, field) in self.schema.0.iter().enumerate().skip(2) {
            let Some(value) = fields.get(i) else { break };
            match field {
                InvField::Size => {
                    entry.size = Some(value.parse::<u64>().map_err(|e| {
                        Error::invalid_argument(format!("bad inventory size {value:?}: {e}"))
                    })?);
                }
                InvField::ETag => entry.etag = Some((*value).to_string()),
                InvField::LastModifiedDate => entry.last_modified = Some((*value).to_string()),
                _ => {}
            }
        }
        Ok(Some(entry))
    }
}

/// Strip the surrounding double quotes of a CSV value.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}
