//! Prometheus-compatible blob store counters.
//!
//! Stores report events through an injected [`MetricsSink`] instead of
//! process-wide counters, so several stores in one process (tests, the
//! public and restricted namespaces) keep separate tallies.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Events the store counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreCounter {
    /// A remote pool was asked for a blob.
    RemoteAttempt,
    /// A remote pool answered "not found".
    RemoteNotFound,
    /// A remote pool failed (timeout, protocol error, auth).
    RemoteFailure,
    /// A read was served from local disk while a remote tier was configured.
    LocalFallback,
    /// No tier had the blob.
    NotFound,
    /// An upload was committed.
    UploadCommitted,
    /// An upload was abandoned or failed before commit.
    UploadAborted,
    /// Declared and computed SHA-1 differed.
    DigestMismatch,
    /// A freshly allocated identity already had a file on disk.
    DuplicateIdentity,
    /// An upload targeted another environment's database.
    WrongEnvironment,
}

impl StoreCounter {
    /// Every counter, in export order.
    pub const ALL: [StoreCounter; 10] = [
        StoreCounter::RemoteAttempt,
        StoreCounter::RemoteNotFound,
        StoreCounter::RemoteFailure,
        StoreCounter::LocalFallback,
        StoreCounter::NotFound,
        StoreCounter::UploadCommitted,
        StoreCounter::UploadAborted,
        StoreCounter::DigestMismatch,
        StoreCounter::DuplicateIdentity,
        StoreCounter::WrongEnvironment,
    ];

    /// Prometheus metric name.
    pub fn metric_name(self) -> &'static str {
        match self {
            StoreCounter::RemoteAttempt => "librarian_remote_attempts_total",
            StoreCounter::RemoteNotFound => "librarian_remote_not_found_total",
            StoreCounter::RemoteFailure => "librarian_remote_failures_total",
            StoreCounter::LocalFallback => "librarian_local_fallbacks_total",
            StoreCounter::NotFound => "librarian_not_found_total",
            StoreCounter::UploadCommitted => "librarian_uploads_committed_total",
            StoreCounter::UploadAborted => "librarian_uploads_aborted_total",
            StoreCounter::DigestMismatch => "librarian_digest_mismatches_total",
            StoreCounter::DuplicateIdentity => "librarian_duplicate_identities_total",
            StoreCounter::WrongEnvironment => "librarian_wrong_environment_total",
        }
    }

    fn help(self) -> &'static str {
        match self {
            StoreCounter::RemoteAttempt => "Remote pool read attempts",
            StoreCounter::RemoteNotFound => "Remote pool reads answered with not found",
            StoreCounter::RemoteFailure => "Remote pool reads that failed",
            StoreCounter::LocalFallback => "Reads served by local disk after the remote tier",
            StoreCounter::NotFound => "Reads that found the blob in no tier",
            StoreCounter::UploadCommitted => "Uploads committed",
            StoreCounter::UploadAborted => "Uploads aborted before commit",
            StoreCounter::DigestMismatch => "Uploads rejected for a SHA-1 mismatch",
            StoreCounter::DuplicateIdentity => "Commits refused because the path already existed",
            StoreCounter::WrongEnvironment => "Uploads rejected for targeting another database",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Receiver for store events.
pub trait MetricsSink: Send + Sync {
    /// Records one occurrence of `counter`.
    fn increment(&self, counter: StoreCounter);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _counter: StoreCounter) {}
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetricsSnapshot {
    /// Remote pool read attempts.
    pub remote_attempts: u64,
    /// Remote "not found" answers.
    pub remote_not_found: u64,
    /// Remote failures.
    pub remote_failures: u64,
    /// Local disk fallbacks.
    pub local_fallbacks: u64,
    /// Genuine misses.
    pub not_found: u64,
    /// Committed uploads.
    pub uploads_committed: u64,
    /// Aborted uploads.
    pub uploads_aborted: u64,
    /// SHA-1 mismatches.
    pub digest_mismatches: u64,
    /// Duplicate identities.
    pub duplicate_identities: u64,
    /// Wrong-environment rejections.
    pub wrong_environment: u64,
}

/// Atomic counter set implementing [`MetricsSink`].
#[derive(Debug, Default)]
pub struct StoreMetrics {
    counters: [AtomicU64; 10],
}

impl StoreMetrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter.
    pub fn get(&self, counter: StoreCounter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Copies all counters.
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            remote_attempts: self.get(StoreCounter::RemoteAttempt),
            remote_not_found: self.get(StoreCounter::RemoteNotFound),
            remote_failures: self.get(StoreCounter::RemoteFailure),
            local_fallbacks: self.get(StoreCounter::LocalFallback),
            not_found: self.get(StoreCounter::NotFound),
            uploads_committed: self.get(StoreCounter::UploadCommitted),
            uploads_aborted: self.get(StoreCounter::UploadAborted),
            digest_mismatches: self.get(StoreCounter::DigestMismatch),
            duplicate_identities: self.get(StoreCounter::DuplicateIdentity),
            wrong_environment: self.get(StoreCounter::WrongEnvironment),
        }
    }

    /// Renders all counters in the Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        for counter in StoreCounter::ALL {
            let name = counter.metric_name();
            let _ = writeln!(out, "# HELP {} {}", name, counter.help());
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, self.get(counter));
        }
        out
    }
}

impl MetricsSink for StoreMetrics {
    fn increment(&self, counter: StoreCounter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = StoreMetrics::new();
        assert_eq!(metrics.snapshot(), StoreMetricsSnapshot::default());
    }

    #[test]
    fn test_increment_is_per_counter() {
        let metrics = StoreMetrics::new();
        metrics.increment(StoreCounter::RemoteAttempt);
        metrics.increment(StoreCounter::RemoteAttempt);
        metrics.increment(StoreCounter::RemoteFailure);

        let snap = metrics.snapshot();
        assert_eq!(snap.remote_attempts, 2);
        assert_eq!(snap.remote_failures, 1);
        assert_eq!(snap.local_fallbacks, 0);
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = StoreMetrics::new();
        let b = StoreMetrics::new();
        a.increment(StoreCounter::UploadCommitted);
        assert_eq!(a.get(StoreCounter::UploadCommitted), 1);
        assert_eq!(b.get(StoreCounter::UploadCommitted), 0);
    }

    #[test]
    fn test_counter_indices_match_all() {
        for (i, counter) in StoreCounter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), i);
        }
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = StoreMetrics::new();
        metrics.increment(StoreCounter::DigestMismatch);
        let text = metrics.export_prometheus();
        assert!(text.contains("# TYPE librarian_digest_mismatches_total counter"));
        assert!(text.contains("librarian_digest_mismatches_total 1"));
        assert!(text.contains("librarian_remote_attempts_total 0"));
    }

    #[test]
    fn test_noop_sink() {
        NoopMetrics.increment(StoreCounter::NotFound);
    }
}
