//! Batch coordination: validation, bounded fan-out, ordered aggregation.
//!
//! Every job runs on Tokio's blocking pool behind a semaphore permit and a
//! per-job timeout. Results are collected by a single aggregator (the loop
//! over the [`JoinSet`]) in completion order; for each completion it bumps
//! `completed`, stores the result and publishes exactly one progress event.
//! No lock is involved because only the aggregator touches [`BatchState`].

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use rawbatch_core::progress::{percent_complete, ProgressEvent};
use rawbatch_core::raw_formats::{base_name, disambiguate, is_raw_file};
use rawbatch_core::types::BatchId;
use rawbatch_events::{BatchEvent, EventBus};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::converter::{ConversionJob, ConversionResult, Converter};
use crate::error::ValidationError;

/// Default per-job timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of parallel conversions when nothing is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of conversions running at once.
    pub concurrency: usize,
    /// A job still running after this long is recorded as failed.
    pub job_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Jobs that passed validation, plus the names that were filtered out.
#[derive(Debug)]
pub struct AcceptedJobs {
    jobs: Vec<ConversionJob>,
    pub skipped: Vec<String>,
}

impl AcceptedJobs {
    /// Reject empty batches and batches without any RAW file.
    ///
    /// Files without a recognized extension are dropped, not failed. Output
    /// names that collide (`a.CR2` and `a.nef`) are made unique here, in
    /// submission order, so the archive does not depend on which job
    /// finishes first.
    pub fn validate(jobs: Vec<ConversionJob>) -> Result<Self, ValidationError> {
        if jobs.is_empty() {
            return Err(ValidationError::NoFiles);
        }

        let (mut jobs, rejected): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .partition(|job| is_raw_file(&job.source_name));

        if jobs.is_empty() {
            return Err(ValidationError::NoRawFiles);
        }

        let mut taken: HashSet<String> = HashSet::with_capacity(jobs.len());
        for job in &mut jobs {
            let name = disambiguate(&job.output_name, |n| taken.contains(n));
            if name != job.output_name {
                tracing::debug!(file = %job.source_name, original = %job.output_name, renamed = %name, "Output name collision");
                job.output_name = name.clone();
            }
            taken.insert(name);
        }

        Ok(Self {
            jobs,
            skipped: rejected.into_iter().map(|job| job.source_name).collect(),
        })
    }

    /// Accepted jobs in submission order.
    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Batch state
// ---------------------------------------------------------------------------

/// A file that failed to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub original_name: String,
    pub message: String,
}

/// Progress and results of one batch. Owned by a single coordinator run.
#[derive(Debug)]
pub struct BatchState {
    pub batch_id: BatchId,
    pub total: usize,
    pub completed: usize,
    /// Successful outputs keyed by archive entry name.
    pub results: BTreeMap<String, Vec<u8>>,
    pub failures: Vec<FailedFile>,
}

impl BatchState {
    pub fn new(batch_id: BatchId, total: usize) -> Self {
        Self {
            batch_id,
            total,
            completed: 0,
            results: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.results.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }

    /// Record one finished job and build its progress event.
    fn record(&mut self, result: ConversionResult) -> ProgressEvent {
        debug_assert!(self.completed < self.total, "more results than jobs");
        self.completed = (self.completed + 1).min(self.total);
        let percent = percent_complete(self.completed, self.total);

        match result {
            ConversionResult::Success {
                output_name,
                jpeg_bytes,
            } => {
                let event = ProgressEvent::converted(base_name(&output_name), percent);
                if self.results.insert(output_name, jpeg_bytes).is_some() {
                    tracing::warn!(batch_id = %self.batch_id, "Duplicate output name replaced an earlier result");
                }
                event
            }
            ConversionResult::Failure {
                original_name,
                message,
            } => {
                let event = ProgressEvent::failed(message.clone(), percent);
                self.failures.push(FailedFile {
                    original_name,
                    message,
                });
                event
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Fans a batch out to a bounded pool of conversions.
///
/// Cheap to share; every [`run_batch`](Coordinator::run_batch) call owns its
/// own [`BatchState`], so concurrent batches never see each other.
pub struct Coordinator {
    converter: Arc<Converter>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(converter: Arc<Converter>, config: CoordinatorConfig) -> Self {
        Self { converter, config }
    }

    /// Validate and run a batch to completion.
    ///
    /// Validation errors are returned before any job starts and before any
    /// event is published.
    pub async fn run_batch(
        &self,
        batch_id: BatchId,
        jobs: Vec<ConversionJob>,
        bus: &EventBus,
    ) -> Result<BatchState, ValidationError> {
        let accepted = AcceptedJobs::validate(jobs)?;
        Ok(self.run_accepted(batch_id, accepted, bus).await)
    }

    /// Run already-validated jobs. Returns once every job produced a result.
    pub async fn run_accepted(
        &self,
        batch_id: BatchId,
        accepted: AcceptedJobs,
        bus: &EventBus,
    ) -> BatchState {
        for name in &accepted.skipped {
            tracing::info!(%batch_id, file = %name, "Skipping file without RAW extension");
        }

        let mut state = BatchState::new(batch_id, accepted.len());
        tracing::info!(
            %batch_id,
            total = state.total,
            concurrency = self.config.concurrency,
            "Starting batch",
        );

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for job in accepted.jobs {
            tasks.spawn(run_job(
                Arc::clone(&self.converter),
                Arc::clone(&permits),
                job,
                self.config.job_timeout,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                tracing::error!(%batch_id, error = %e, "Conversion task aborted");
                ConversionResult::Failure {
                    original_name: String::new(),
                    message: format!("error converting file: task aborted ({e})"),
                }
            });

            let event = state.record(result);
            tracing::debug!(
                %batch_id,
                completed = state.completed,
                total = state.total,
                is_error = event.is_error,
                "Job finished",
            );
            bus.publish(BatchEvent::progress(batch_id, event));
        }

        tracing::info!(
            %batch_id,
            succeeded = state.success_count(),
            failed = state.failure_count(),
            "Batch finished",
        );
        state
    }
}

/// Run one job on the blocking pool, folding panics and timeouts into
/// failures.
///
/// The permit moves into the blocking closure and is released only when the
/// conversion thread returns. A timed-out job is reported right away but
/// keeps its slot until its thread really ends, so at most `concurrency`
/// decodes ever run at once. The timeout starts once the permit is held.
async fn run_job(
    converter: Arc<Converter>,
    permits: Arc<Semaphore>,
    job: ConversionJob,
    timeout: Duration,
) -> ConversionResult {
    let name = job.source_name.clone();

    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return ConversionResult::failed(&name, "worker pool closed"),
    };

    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        converter.convert(job)
    });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => {
            tracing::error!(file = %name, "Decoder panicked");
            ConversionResult::failed(&name, "decoder crashed on this file")
        }
        Ok(Err(e)) => ConversionResult::failed(&name, e),
        Err(_) => {
            // The blocking thread keeps running with its permit; its result is discarded.
            tracing::warn!(file = %name, timeout_secs = timeout.as_secs(), "Conversion timed out");
            ConversionResult::failed(&name, format!("timed out after {}s", timeout.as_secs()))
        }
    }
}
