use std::time::{Duration, Instant};

use config::shared::WriteBatchConfig;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::concurrency::policy::{CommitRetry, build_commit_policy};
use crate::concurrency::unit::BatchUnit;
use crate::error::{ErrorKind, SyncResult};
use crate::failpoints::{COMMIT_UNIT_BEFORE_COMMIT, sync_fail_point};
use crate::metrics::{record_commit, record_commit_failure, record_commit_retry};
use crate::store::DocumentStore;
use crate::sync_error;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Timing of the commit retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub commit_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl From<&WriteBatchConfig> for RetrySettings {
    fn from(config: &WriteBatchConfig) -> Self {
        Self {
            commit_timeout: config.commit_timeout(),
            max_retries: config.max_retries,
            base_delay: config.base_retry_delay(),
        }
    }
}

/// Result of a successful unit commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub operations: usize,
    pub mutations: usize,
    /// Number of commit attempts, including the successful one.
    pub attempts: u32,
}

/// Returns the delay before retry number `attempt + 1`: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Commits `unit` to `store`, retrying transient failures with exponential backoff.
///
/// Each attempt is bounded by the commit timeout; an attempt that times out counts as
/// [`ErrorKind::StoreDeadlineExceeded`]. The batch only holds recorded data, so a retry re-sends
/// exactly the writes of the failed attempt.
pub async fn commit_unit<S>(
    store: &S,
    unit: &BatchUnit,
    settings: RetrySettings,
) -> SyncResult<CommitOutcome>
where
    S: DocumentStore,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let result = match sync_fail_point(COMMIT_UNIT_BEFORE_COMMIT) {
            Ok(()) => match timeout(settings.commit_timeout, store.commit(unit.batch())).await {
                Ok(result) => result,
                Err(_) => Err(sync_error!(
                    ErrorKind::StoreDeadlineExceeded,
                    "Batch commit timed out",
                    format!(
                        "unit {} got no response within {} ms",
                        unit.id(),
                        settings.commit_timeout.as_millis()
                    )
                )),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                debug!(
                    unit_id = unit.id(),
                    operations = unit.operations(),
                    attempts = attempt + 1,
                    "batch unit committed"
                );
                record_commit(unit.operations(), started.elapsed());

                return Ok(CommitOutcome {
                    operations: unit.operations(),
                    mutations: unit.batch().len(),
                    attempts: attempt + 1,
                });
            }
            Err(err) => {
                let policy = build_commit_policy(&err);
                if policy.retry() == CommitRetry::Backoff && attempt < settings.max_retries {
                    let backoff = backoff_delay(settings.base_delay, attempt);
                    warn!(
                        unit_id = unit.id(),
                        attempt = attempt + 1,
                        max_attempts = settings.max_retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "batch commit failed with a transient error, backing off before retry"
                    );
                    record_commit_retry(err.kind());
                    sleep(backoff).await;
                    attempt += 1;

                    continue;
                }

                record_commit_failure();

                return Err(err);
            }
        }
    }
}
