use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::store::memory::MemoryStore;
use crate::store::{DocumentStore, Query, WriteBatch};
use crate::sync_error;
use crate::types::{Document, DocumentKey};

/// Failure returned by one scripted commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Unavailable,
    DeadlineExceeded,
    /// A non-retryable commit failure.
    Fatal,
}

impl FaultType {
    fn into_error(self) -> SyncError {
        let kind = match self {
            FaultType::Unavailable => ErrorKind::StoreUnavailable,
            FaultType::DeadlineExceeded => ErrorKind::StoreDeadlineExceeded,
            FaultType::Fatal => ErrorKind::StoreCommitFailed,
        };

        sync_error!(kind, "Injected commit fault")
    }
}

#[derive(Debug, Default)]
struct Gauge {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: AtomicUsize,
}

/// [`MemoryStore`] whose commits can be delayed and made to fail.
///
/// Scripted faults are consumed one per commit attempt, in order; once the script is empty
/// commits reach the wrapped store. Clones share script, gauge and documents.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Mutex<VecDeque<FaultType>>>,
    commit_latency: Duration,
    gauge: Arc<Gauge>,
}

impl FaultyStore {
    pub fn wrap(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(VecDeque::new())),
            commit_latency: Duration::ZERO,
            gauge: Arc::new(Gauge::default()),
        }
    }

    /// Delays every commit attempt by `latency`.
    pub fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = latency;
        self
    }

    /// Appends faults to the script.
    pub async fn fail_next_commits(&self, faults: impl IntoIterator<Item = FaultType>) {
        self.faults.lock().await.extend(faults);
    }

    pub fn get_inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Number of commit attempts, failed ones included.
    pub fn commit_attempts(&self) -> usize {
        self.gauge.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of commits observed running at the same time.
    pub fn max_concurrent_commits(&self) -> usize {
        self.gauge.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DocumentStore for FaultyStore {
    async fn get(&self, key: &DocumentKey) -> SyncResult<Option<Document>> {
        self.inner.get(key).await
    }

    async fn get_all(&self, keys: &[DocumentKey]) -> SyncResult<Vec<Option<Document>>> {
        self.inner.get_all(keys).await
    }

    async fn query(&self, query: &Query) -> SyncResult<Vec<(String, Document)>> {
        self.inner.query(query).await
    }

    async fn commit(&self, batch: &WriteBatch) -> SyncResult<()> {
        self.gauge.attempts.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let fault = self.faults.lock().await.pop_front();
        if !self.commit_latency.is_zero() {
            sleep(self.commit_latency).await;
        }

        let result = match fault {
            Some(fault) => Err(fault.into_error()),
            None => self.inner.commit(batch).await,
        };
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);

        result
    }
}
