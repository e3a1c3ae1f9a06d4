use std::collections::VecDeque;
use std::mem;

use config::shared::WriteBatchConfig;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::concurrency::commit::{CommitOutcome, RetrySettings, commit_unit};
use crate::concurrency::policy::build_commit_policy;
use crate::concurrency::unit::{BatchUnit, UnitState};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::metrics::record_throttle;
use crate::store::{DocumentStore, WriteOperation};
use crate::sync_error;

type CommitTaskOutput = (BatchUnit, SyncResult<CommitOutcome>);

/// Totals of the commits completed since the previous flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches_committed: usize,
    pub operations_committed: usize,
    pub mutations_committed: usize,
    /// Commit attempts, retries included.
    pub commit_attempts: u64,
    /// Number of times the commit ceiling was halved.
    pub throttle_events: usize,
    /// Commit ceiling in effect when the flush completed.
    pub concurrency_limit: usize,
}

impl FlushReport {
    fn record_commit(&mut self, outcome: &CommitOutcome) {
        self.batches_committed += 1;
        self.operations_committed += outcome.operations;
        self.mutations_committed += outcome.mutations;
        self.commit_attempts += u64::from(outcome.attempts);
    }
}

/// Why one flush pass stopped early.
enum FlushFailure {
    /// The store reported deadline exceeded after every retry; lowering the ceiling may help.
    Throttle(SyncError),
    /// Any other failure.
    Abort(SyncError),
}

/// Pools write operations into bounded batches and commits them under a concurrency ceiling.
///
/// [`BatchWriteCoordinator::submit`] records each operation into the first open unit with
/// room. When every unit is full, the unit filled the longest ago is committed in the
/// background and replaced by an empty one; `submit` waits for running commits when the ceiling
/// is reached. [`BatchWriteCoordinator::flush`] is a barrier committing everything recorded.
///
/// The coordinator is driven by a single writer through `&mut self`. No ordering is guaranteed
/// between operations recorded in different units.
pub struct BatchWriteCoordinator<S> {
    store: S,
    config: WriteBatchConfig,
    retry_settings: RetrySettings,
    pool: Vec<BatchUnit>,
    in_flight: JoinSet<CommitTaskOutput>,
    concurrency_limit: usize,
    deferred: Vec<(BatchUnit, SyncError)>,
    next_unit_id: u64,
    fill_sequence: u64,
    report: FlushReport,
}

impl<S> BatchWriteCoordinator<S>
where
    S: DocumentStore + Clone + Send + Sync + 'static,
{
    /// Creates a coordinator with `pool_size` empty units.
    ///
    /// `config` is expected to be validated; zero sizes are raised to one.
    pub fn new(store: S, config: WriteBatchConfig) -> Self {
        let retry_settings = RetrySettings::from(&config);
        let concurrency_limit = config.max_concurrent_commits.max(1);

        let mut coordinator = Self {
            store,
            config,
            retry_settings,
            pool: Vec::new(),
            in_flight: JoinSet::new(),
            concurrency_limit,
            deferred: Vec::new(),
            next_unit_id: 0,
            fill_sequence: 0,
            report: FlushReport::default(),
        };
        coordinator.reset_pool();

        coordinator
    }

    /// Current commit ceiling.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Number of commits running in the background.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of operations recorded in open units and not committed yet.
    pub fn pending_operations(&self) -> usize {
        self.pool.iter().map(BatchUnit::operations).sum()
    }

    /// Records `operation` into an open unit.
    ///
    /// The operation is recorded before this returns. A fatal commit failure observed while
    /// waiting for room is returned here; deadline failures are kept for the next flush.
    pub async fn submit(&mut self, operation: WriteOperation) -> SyncResult<()> {
        let max_operations = self.max_batch_size();

        let index = match self
            .pool
            .iter()
            .position(|unit| !unit.is_full(max_operations))
        {
            Some(index) => index,
            None => self.swap_out_full_unit().await?,
        };

        let unit = &mut self.pool[index];
        unit.record(operation);
        if unit.is_full(max_operations) {
            unit.mark_filled(self.fill_sequence);
            self.fill_sequence += 1;
        }

        Ok(())
    }

    /// Commits every recorded operation and waits for all commits to finish.
    ///
    /// When commits keep exceeding their deadline, the ceiling is halved down to
    /// `min_concurrent_commits` and the remaining units are committed again. At the floor the
    /// error is returned. Units committed before a failure stay committed; units that failed are
    /// kept for a later flush.
    pub async fn flush(&mut self) -> SyncResult<FlushReport> {
        loop {
            match self.flush_once().await {
                Ok(()) => {
                    self.reset_pool();

                    let mut report = mem::take(&mut self.report);
                    report.concurrency_limit = self.concurrency_limit;
                    info!(
                        batches = report.batches_committed,
                        operations = report.operations_committed,
                        attempts = report.commit_attempts,
                        throttle_events = report.throttle_events,
                        concurrency_limit = report.concurrency_limit,
                        "write coordinator flushed"
                    );

                    return Ok(report);
                }
                Err(FlushFailure::Throttle(err)) => {
                    let floor = self.min_concurrency_limit();
                    if self.concurrency_limit <= floor {
                        error!(
                            concurrency_limit = self.concurrency_limit,
                            error = %err,
                            "store deadline exceeded at the minimum commit ceiling"
                        );

                        return Err(err);
                    }

                    let reduced = (self.concurrency_limit / 2).max(floor);
                    warn!(
                        previous = self.concurrency_limit,
                        reduced,
                        pending_operations = self.pending_operations(),
                        "store deadline exceeded, throttling batch commits"
                    );
                    self.concurrency_limit = reduced;
                    self.report.throttle_events += 1;
                    record_throttle();
                }
                Err(FlushFailure::Abort(err)) => {
                    error!(error = %err, "flush aborted");

                    return Err(err);
                }
            }
        }
    }

    async fn flush_once(&mut self) -> Result<(), FlushFailure> {
        let mut throttle_errors = Vec::new();
        let mut fatal_errors = Vec::new();

        while let Some(joined) = self.in_flight.join_next().await {
            self.collect_flush_commit(joined, &mut throttle_errors, &mut fatal_errors);
        }

        for (mut unit, err) in mem::take(&mut self.deferred) {
            unit.reopen();
            self.pool.push(unit);
            throttle_errors.push(err);
        }

        check_flush_errors(throttle_errors, fatal_errors)?;

        let (pending, empty): (Vec<_>, Vec<_>) = mem::take(&mut self.pool)
            .into_iter()
            .partition(|unit| !unit.is_empty());
        self.pool = empty;

        let mut pending: VecDeque<BatchUnit> = pending.into();
        let chunk_size = self
            .config
            .flush_fan_out
            .min(self.concurrency_limit)
            .max(1);

        while !pending.is_empty() {
            let chunk_len = chunk_size.min(pending.len());
            debug!(units = chunk_len, remaining = pending.len() - chunk_len, "committing flush chunk");
            for unit in pending.drain(..chunk_len) {
                self.spawn_commit(unit);
            }

            let mut throttle_errors = Vec::new();
            let mut fatal_errors = Vec::new();
            while let Some(joined) = self.in_flight.join_next().await {
                self.collect_flush_commit(joined, &mut throttle_errors, &mut fatal_errors);
            }

            if !throttle_errors.is_empty() || !fatal_errors.is_empty() {
                self.pool.extend(pending.drain(..));
                return check_flush_errors(throttle_errors, fatal_errors);
            }

            if !pending.is_empty() {
                sleep(self.config.flush_chunk_pause()).await;
            }
        }

        Ok(())
    }

    /// Commits the unit filled the longest ago and returns the index of its empty replacement.
    async fn swap_out_full_unit(&mut self) -> SyncResult<usize> {
        let index = self
            .pool
            .iter()
            .enumerate()
            .min_by_key(|(_, unit)| unit.filled_at())
            .map(|(index, _)| index)
            .ok_or_else(|| sync_error!(ErrorKind::InvalidState, "Batch unit pool is empty"))?;

        self.wait_for_capacity().await?;

        let fresh = self.new_unit();
        let full = mem::replace(&mut self.pool[index], fresh);
        self.spawn_commit(full);

        Ok(index)
    }

    async fn wait_for_capacity(&mut self) -> SyncResult<()> {
        while self.in_flight.len() >= self.concurrency_limit {
            let Some(joined) = self.in_flight.join_next().await else {
                break;
            };
            self.collect_background_commit(joined)?;
        }

        Ok(())
    }

    fn spawn_commit(&mut self, mut unit: BatchUnit) {
        unit.set_state(UnitState::Committing);
        debug!(
            unit_id = unit.id(),
            operations = unit.operations(),
            in_flight = self.in_flight.len() + 1,
            "spawning batch commit"
        );

        let store = self.store.clone();
        let settings = self.retry_settings;
        self.in_flight.spawn(async move {
            let result = commit_unit(&store, &unit, settings).await;
            (unit, result)
        });
    }

    fn collect_background_commit(
        &mut self,
        joined: Result<CommitTaskOutput, JoinError>,
    ) -> SyncResult<()> {
        let (mut unit, result) = joined.map_err(join_error)?;

        match result {
            Ok(outcome) => {
                unit.set_state(UnitState::Committed);
                self.report.record_commit(&outcome);

                Ok(())
            }
            Err(err) if build_commit_policy(&err).throttles() => {
                warn!(
                    unit_id = unit.id(),
                    error = %err,
                    "background commit exceeded its deadline, deferring to the next flush"
                );
                unit.set_state(UnitState::Failed);
                self.deferred.push((unit, err));

                Ok(())
            }
            Err(err) => {
                error!(unit_id = unit.id(), error = %err, "background commit failed");
                unit.reopen();
                self.pool.push(unit);

                Err(err)
            }
        }
    }

    fn collect_flush_commit(
        &mut self,
        joined: Result<CommitTaskOutput, JoinError>,
        throttle_errors: &mut Vec<SyncError>,
        fatal_errors: &mut Vec<SyncError>,
    ) {
        let (mut unit, result) = match joined {
            Ok(output) => output,
            Err(err) => {
                fatal_errors.push(join_error(err));
                return;
            }
        };

        match result {
            Ok(outcome) => {
                unit.set_state(UnitState::Committed);
                self.report.record_commit(&outcome);
            }
            Err(err) => {
                if build_commit_policy(&err).throttles() {
                    throttle_errors.push(err);
                } else {
                    fatal_errors.push(err);
                }
                unit.reopen();
                self.pool.push(unit);
            }
        }
    }

    fn reset_pool(&mut self) {
        let pool_size = self.config.pool_size.max(1);
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            pool.push(self.new_unit());
        }
        self.pool = pool;
    }

    fn new_unit(&mut self) -> BatchUnit {
        let unit = BatchUnit::new(self.next_unit_id);
        self.next_unit_id += 1;
        unit
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size.max(1)
    }

    fn min_concurrency_limit(&self) -> usize {
        self.config
            .min_concurrent_commits
            .clamp(1, self.config.max_concurrent_commits.max(1))
    }
}

fn check_flush_errors(
    throttle_errors: Vec<SyncError>,
    fatal_errors: Vec<SyncError>,
) -> Result<(), FlushFailure> {
    if !fatal_errors.is_empty() {
        return Err(FlushFailure::Abort(SyncError::from(fatal_errors)));
    }

    if !throttle_errors.is_empty() {
        return Err(FlushFailure::Throttle(SyncError::from(throttle_errors)));
    }

    Ok(())
}

fn join_error(err: JoinError) -> SyncError {
    sync_error!(
        ErrorKind::CommitTaskPanic,
        "Batch commit task did not complete",
        err
    )
}
