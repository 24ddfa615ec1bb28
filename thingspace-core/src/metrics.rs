//! Space metrics
//!
//! Counters for transactions, reactive work, evictions and write-behind
//! outcomes, shared between the space and its writer thread.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SpaceMetrics {
    /// Transactions run, reads included
    pub transactions: AtomicU64,

    /// Imprint rounds, one per fixpoint iteration
    pub rounds: AtomicU64,

    /// Entities handed to rederive
    pub rederivations: AtomicU64,

    /// Nodes removed by cleanup
    pub evictions: AtomicU64,

    pub writes_succeeded: AtomicU64,

    pub writes_failed: AtomicU64,
}

impl SpaceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rederivation(&self) {
        self.rederivations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_write(&self, ok: bool) {
        let counter = if ok {
            &self.writes_succeeded
        } else {
            &self.writes_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.transactions.store(0, Ordering::Relaxed);
        self.rounds.store(0, Ordering::Relaxed);
        self.rederivations.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.writes_succeeded.store(0, Ordering::Relaxed);
        self.writes_failed.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions: self.transactions.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            rederivations: self.rederivations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            writes_succeeded: self.writes_succeeded.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of space metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub transactions: u64,
    pub rounds: u64,
    pub rederivations: u64,
    pub evictions: u64,
    pub writes_succeeded: u64,
    pub writes_failed: u64,
}

impl MetricsSnapshot {
    /// Share of writes that failed (0.0 to 1.0)
    pub fn write_failure_rate(&self) -> f64 {
        let total = self.writes_succeeded + self.writes_failed;
        if total == 0 {
            0.0
        } else {
            self.writes_failed as f64 / total as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Transactions: {} | Rounds: {} | Rederivations: {}",
            self.transactions, self.rounds, self.rederivations
        )?;
        writeln!(f, "Evictions: {}", self.evictions)?;
        writeln!(
            f,
            "Writes: {} ok | {} failed | Failure Rate: {:.1}%",
            self.writes_succeeded,
            self.writes_failed,
            self.write_failure_rate() * 100.0
        )?;
        Ok(())
    }
}
