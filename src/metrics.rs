// Run outcome metrics
//
// Lock-free counters shared by concurrent copy tasks, folded into a RunSummary at the end

use crate::models::CopyOutcome;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Per-run outcome counters
///
/// Uses atomic operations so every in-flight copy task can record its outcome without locks.
#[derive(Debug)]
pub struct OutcomeCounters {
    /// Files copied into the sorted tree
    pub copied: AtomicUsize,

    /// Tasks whose source file was not a regular file
    pub source_missing: AtomicUsize,

    /// Tasks that failed with an I/O error
    pub io_failures: AtomicUsize,

    /// Destination directories removed because nothing landed in them
    pub directories_removed: AtomicUsize,

    /// Manifest records handed to the scheduler
    pub records_processed: AtomicUsize,

    stopped: AtomicBool,

    start_time: Instant,
}

impl OutcomeCounters {
    pub fn new() -> Self {
        Self {
            copied: AtomicUsize::new(0),
            source_missing: AtomicUsize::new(0),
            io_failures: AtomicUsize::new(0),
            directories_removed: AtomicUsize::new(0),
            records_processed: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    pub fn record_outcome(&self, outcome: &CopyOutcome) {
        let counter = match outcome {
            CopyOutcome::Copied => &self.copied,
            CopyOutcome::SourceMissing => &self.source_missing,
            CopyOutcome::IoFailure(_) => &self.io_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_directory_removed(&self) {
        self.directories_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_record_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            copied: self.copied.load(Ordering::Relaxed),
            source_missing: self.source_missing.load(Ordering::Relaxed),
            io_failures: self.io_failures.load(Ordering::Relaxed),
            directories_removed: self.directories_removed.load(Ordering::Relaxed),
            records_processed: self.records_processed.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for OutcomeCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Final counts of a copy run, returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub copied: usize,
    pub source_missing: usize,
    pub io_failures: usize,
    pub directories_removed: usize,
    pub records_processed: usize,
    /// The stop flag was observed before every record was enumerated
    pub stopped: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_tasks(&self) -> usize {
        self.copied + self.source_missing + self.io_failures
    }

    pub fn has_failures(&self) -> bool {
        self.source_missing > 0 || self.io_failures > 0
    }

    /// Fold another category's summary into this one
    pub fn merge(&mut self, other: &RunSummary) {
        self.copied += other.copied;
        self.source_missing += other.source_missing;
        self.io_failures += other.io_failures;
        self.directories_removed += other.directories_removed;
        self.records_processed += other.records_processed;
        self.stopped |= other.stopped;
        self.elapsed += other.elapsed;
    }

    /// Get a summary string of the run
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} copied", self.copied)];

        if self.source_missing > 0 {
            parts.push(format!("{} missing", self.source_missing));
        }
        if self.io_failures > 0 {
            parts.push(format!("{} failed", self.io_failures));
        }
        if self.directories_removed > 0 {
            parts.push(format!("{} empty folders removed", self.directories_removed));
        }
        if self.stopped {
            parts.push("stopped early".to_string());
        }

        parts.join(", ")
    }

    /// Log summary
    pub fn log_summary(&self, label: &str) {
        tracing::info!("=== {} Run Summary ===", label);
        tracing::info!("Elapsed: {:.2}s", self.elapsed.as_secs_f64());
        tracing::info!(
            "Records: {}, tasks: {} ({})",
            self.records_processed,
            self.total_tasks(),
            self.summary()
        );
    }
}
