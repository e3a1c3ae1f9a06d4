//! Metrics definitions for reconciliation runs and batch commits.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::ErrorKind;
use crate::reconciler::RunSummary;

/// Label for the outcome of a commit.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the status of a local record in a run.
pub const STATUS_LABEL: &str = "status";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Commit metrics

/// Counter for batch unit commits, by outcome.
pub const SYNC_BATCH_COMMITS_TOTAL: &str = "sync_batch_commits_total";

/// Counter for commit attempts retried after a transient error.
pub const SYNC_BATCH_COMMIT_RETRIES_TOTAL: &str = "sync_batch_commit_retries_total";

/// Histogram for the duration of successful commits, retries included.
pub const SYNC_BATCH_COMMIT_DURATION_SECONDS: &str = "sync_batch_commit_duration_seconds";

/// Counter for write operations committed.
pub const SYNC_OPERATIONS_COMMITTED_TOTAL: &str = "sync_operations_committed_total";

/// Counter for deadline failures that lowered the commit concurrency.
pub const SYNC_COMMIT_THROTTLE_EVENTS_TOTAL: &str = "sync_commit_throttle_events_total";

// Run metrics

/// Counter for local records seen by runs, by status.
pub const SYNC_RECORDS_TOTAL: &str = "sync_records_total";

/// Counter for image requests that fell back to the placeholder.
pub const SYNC_IMAGE_FAILURES_TOTAL: &str = "sync_image_failures_total";

/// Counter for search index documents written.
pub const SYNC_INDEX_UPDATES_TOTAL: &str = "sync_index_updates_total";

/// Histogram for the duration of complete runs.
pub const SYNC_RUN_DURATION_SECONDS: &str = "sync_run_duration_seconds";

pub(crate) fn record_commit(operations: usize, duration: Duration) {
    counter!(SYNC_BATCH_COMMITS_TOTAL, OUTCOME_LABEL => "committed").increment(1);
    counter!(SYNC_OPERATIONS_COMMITTED_TOTAL).increment(operations as u64);
    histogram!(SYNC_BATCH_COMMIT_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub(crate) fn record_commit_failure() {
    counter!(SYNC_BATCH_COMMITS_TOTAL, OUTCOME_LABEL => "failed").increment(1);
}

pub(crate) fn record_commit_retry(error_kind: ErrorKind) {
    counter!(SYNC_BATCH_COMMIT_RETRIES_TOTAL, ERROR_KIND_LABEL => format!("{error_kind:?}"))
        .increment(1);
}

pub(crate) fn record_throttle() {
    counter!(SYNC_COMMIT_THROTTLE_EVENTS_TOTAL).increment(1);
}

pub(crate) fn record_run(summary: &RunSummary) {
    let statuses = [
        ("matched", summary.matched),
        ("unmatched", summary.unmatched),
        ("skipped_unchanged", summary.skipped_unchanged),
        ("updated", summary.updated),
        ("non_entity_cleared", summary.non_entity_cleared),
    ];
    for (status, count) in statuses {
        counter!(SYNC_RECORDS_TOTAL, STATUS_LABEL => status).increment(count as u64);
    }

    counter!(SYNC_IMAGE_FAILURES_TOTAL).increment(summary.image_failures as u64);
    counter!(SYNC_INDEX_UPDATES_TOTAL).increment(summary.index_updates as u64);
    histogram!(SYNC_RUN_DURATION_SECONDS).record(summary.duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    #[test]
    fn run_counters_are_labelled_by_status() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let summary = RunSummary {
            processed: 4,
            matched: 3,
            unmatched: 1,
            skipped_unchanged: 2,
            updated: 1,
            ..RunSummary::default()
        };

        metrics::with_local_recorder(&recorder, || {
            record_run(&summary);
            record_commit_retry(ErrorKind::StoreUnavailable);
            record_throttle();
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"sync_records_total{status="matched"} 3"#), "{rendered}");
        assert!(rendered.contains(r#"sync_records_total{status="skipped_unchanged"} 2"#));
        assert!(rendered.contains(r#"sync_records_total{status="updated"} 1"#));
        assert!(rendered.contains(
            r#"sync_batch_commit_retries_total{error_kind="StoreUnavailable"} 1"#
        ));
        assert!(rendered.contains("sync_commit_throttle_events_total 1"));
    }
}
