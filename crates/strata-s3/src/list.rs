//! ListObjectsV2 pagination
//!
//! The continuation token is the last object name returned; a resumed
//! listing starts strictly after it. Input entries are sorted by name.

/// Page over sorted names; returns the page and the next continuation
/// token (`None` when the listing is complete).
#[must_use]
pub fn page<'a>(
    sorted_names: &'a [String],
    continuation_token: Option<&str>,
    max_keys: usize,
) -> (Vec<&'a str>, Option<String>) {
    let start = match continuation_token {
        Some(token) => sorted_names.partition_point(|name| name.as_str() <= token),
        None => 0,
    };
    let max_keys = max_keys.max(1);
    let end = (start + max_keys).min(sorted_names.len());
    let entries: Vec<&str> = sorted_names[start..end].iter().map(String::as_str).collect();
    let next = if end < sorted_names.len() {
        entries.last().map(|last| (*last).to_string())
    } else {
        None
    };
    (entries, next)
}
