//! Core operation counters
//!
//! Lock-free counters updated by the datapath and the background workers,
//! exported in Prometheus text form by the daemon's metrics endpoint.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CoreStats {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
    pub renames: AtomicU64,
    pub evictions: AtomicU64,
    pub evicted_bytes: AtomicU64,
    pub oldwork_removed: AtomicU64,
    pub copies_created: AtomicU64,
    pub copies_deleted: AtomicU64,
    pub checksum_errors: AtomicU64,
    pub errors: AtomicU64,
}

impl CoreStats {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Export in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self, node_id: &str) -> String {
        let mut out = String::with_capacity(2 * 1024);
        let counters = [
            ("strata_gets_total", &self.gets),
            ("strata_puts_total", &self.puts),
            ("strata_deletes_total", &self.deletes),
            ("strata_renames_total", &self.renames),
            ("strata_lru_evictions_total", &self.evictions),
            ("strata_lru_evicted_bytes_total", &self.evicted_bytes),
            ("strata_lru_oldwork_removed_total", &self.oldwork_removed),
            ("strata_mirror_copies_created_total", &self.copies_created),
            ("strata_mirror_copies_deleted_total", &self.copies_deleted),
            ("strata_checksum_errors_total", &self.checksum_errors),
            ("strata_errors_total", &self.errors),
        ];
        for (name, counter) in counters {
            writeln!(out, "# TYPE {name} counter").unwrap();
            writeln!(
                out,
                "{name}{{node=\"{node_id}\"}} {}",
                counter.load(Ordering::Relaxed)
            )
            .unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_export() {
        let stats = CoreStats::default();
        CoreStats::inc(&stats.gets);
        CoreStats::add(&stats.evicted_bytes, 4096);
        let text = stats.export_prometheus("t[abc]");
        assert!(text.contains("strata_gets_total{node=\"t[abc]\"} 1"));
        assert!(text.contains("strata_lru_evicted_bytes_total{node=\"t[abc]\"} 4096"));
    }
}
