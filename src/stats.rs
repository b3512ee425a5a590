use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected over one import run
#[derive(Default)]
pub struct ImportStats {
    pub files_loaded: AtomicU64,
    pub records_loaded: AtomicU64,
    pub batches_written: AtomicU64,
    pub batch_retries: AtomicU64,
    pub nodes_created: AtomicU64,
    pub edge_requests: AtomicU64,
    pub edges_created: AtomicU64,
    pub verification_mismatches: AtomicU64,
}

/// Plain copy of [`ImportStats`] for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub files_loaded: u64,
    pub records_loaded: u64,
    pub batches_written: u64,
    pub batch_retries: u64,
    pub nodes_created: u64,
    pub edge_requests: u64,
    pub edges_created: u64,
    pub verification_mismatches: u64,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_loaded(&self, records: u64) {
        self.files_loaded.fetch_add(1, Ordering::Relaxed);
        self.records_loaded.fetch_add(records, Ordering::Relaxed);
    }

    pub fn inc_batches(&self) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.batch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes(&self, count: u64) {
        self.nodes_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_edges(&self, requested: u64, created: u64) {
        self.edge_requests.fetch_add(requested, Ordering::Relaxed);
        self.edges_created.fetch_add(created, Ordering::Relaxed);
    }

    pub fn inc_mismatches(&self) {
        self.verification_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files(&self) -> u64 {
        self.files_loaded.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> u64 {
        self.records_loaded.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.batch_retries.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes_created.load(Ordering::Relaxed)
    }

    pub fn edge_requests(&self) -> u64 {
        self.edge_requests.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_created.load(Ordering::Relaxed)
    }

    pub fn mismatches(&self) -> u64 {
        self.verification_mismatches.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_loaded: self.files(),
            records_loaded: self.records(),
            batches_written: self.batches(),
            batch_retries: self.retries(),
            nodes_created: self.nodes(),
            edge_requests: self.edge_requests(),
            edges_created: self.edges(),
            verification_mismatches: self.mismatches(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = ImportStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn add_loaded_counts_files_and_records() {
        let stats = ImportStats::new();
        stats.add_loaded(10);
        stats.add_loaded(0);
        assert_eq!(stats.files(), 2);
        assert_eq!(stats.records(), 10);
    }

    #[test]
    fn add_edges_tracks_unresolved_gap() {
        let stats = ImportStats::new();
        stats.add_edges(5000, 4990);
        stats.add_edges(12, 12);
        assert_eq!(stats.edge_requests(), 5012);
        assert_eq!(stats.edges(), 5002);
    }

    #[test]
    fn snapshot_captures_state() {
        let stats = ImportStats::new();
        stats.inc_batches();
        stats.inc_batches();
        stats.inc_retries();
        stats.add_nodes(7);
        stats.inc_mismatches();

        let snap = stats.snapshot();
        assert_eq!(snap.batches_written, 2);
        assert_eq!(snap.batch_retries, 1);
        assert_eq!(snap.nodes_created, 7);
        assert_eq!(snap.verification_mismatches, 1);
        assert_eq!(snap.edges_created, 0);
    }
}
