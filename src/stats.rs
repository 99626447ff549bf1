use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected across an import run
#[derive(Default, Debug)]
pub struct ImportStats {
    pub rows_read: AtomicU64,
    pub nodes_created: AtomicU64,
    pub edges_created: AtomicU64,
    pub rows_skipped: AtomicU64,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_rows(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_nodes(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_edges(&self) {
        self.edges_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes_created.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_created.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = ImportStats::new();
        assert_eq!(stats.rows(), 0);
        assert_eq!(stats.nodes(), 0);
        assert_eq!(stats.edges(), 0);
        assert_eq!(stats.skipped(), 0);
    }

    #[test]
    fn mixed_operations() {
        let stats = ImportStats::new();
        stats.inc_rows();
        stats.inc_rows();
        stats.inc_rows();
        stats.inc_nodes();
        stats.inc_nodes();
        stats.inc_edges();
        stats.inc_skipped();

        assert_eq!(stats.rows(), 3);
        assert_eq!(stats.nodes(), 2);
        assert_eq!(stats.edges(), 1);
        assert_eq!(stats.skipped(), 1);
    }
}
