use crate::error::{ErrorKind, SyncError};

/// Whether a failed commit is attempted again.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommitRetry {
    /// Retried after an exponential backoff delay, up to the configured number of retries.
    Backoff,
    /// Not retried; the failure is reported to the caller.
    Fatal,
}

/// How the coordinator reacts to a failed commit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommitPolicy {
    retry: CommitRetry,
    throttles: bool,
}

impl CommitPolicy {
    const fn new(retry: CommitRetry, throttles: bool) -> Self {
        Self { retry, throttles }
    }

    pub fn retry(&self) -> CommitRetry {
        self.retry
    }

    /// Whether the failure signals an overloaded store, which lowers the commit ceiling once
    /// retries are exhausted.
    pub fn throttles(&self) -> bool {
        self.throttles
    }
}

/// Classifies a commit failure.
pub fn build_commit_policy(error: &SyncError) -> CommitPolicy {
    match error.kind() {
        ErrorKind::StoreDeadlineExceeded => CommitPolicy::new(CommitRetry::Backoff, true),
        ErrorKind::StoreUnavailable => CommitPolicy::new(CommitRetry::Backoff, false),
        _ => CommitPolicy::new(CommitRetry::Fatal, false),
    }
}
