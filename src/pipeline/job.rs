use super::channel::results_channel;
use crate::record::RecordKind;
use crate::sink::{process, ProcessOutcome, Sink, SinkKind};
use crate::source::naming::ObjectKey;
use crate::source::object::{BlobStore, ByteRange, SourceObject, TransportError};
use crate::storage::{Checkpoint, CheckpointError, CheckpointStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Object failures logged individually per run. Later ones are only counted.
pub const ERROR_BUDGET: usize = 10;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to list objects under '{prefix}': {source}")]
    Listing {
        prefix: String,
        #[source]
        source: TransportError,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("results drain failed: {0}")]
    Drain(#[from] tokio::task::JoinError),
}

/// One object to process, with its unread range and prior progress resolved.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub object: SourceObject,
    pub key: ObjectKey,
    pub range: ByteRange,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unchanged,
    BeforeFloor,
}

/// What a run does with one discovered object.
#[derive(Debug, Clone)]
pub enum Plan {
    /// New or modified object with unread bytes.
    Dispatch(WorkItem),
    /// Modified object whose bytes were all read already; only metadata moves.
    Refresh(Checkpoint),
    Skip(SkipReason),
}

/// Decide what to do with `object` given its prior checkpoint.
pub fn classify(
    object: &SourceObject,
    key: &ObjectKey,
    prior: Option<&Checkpoint>,
    floor: Option<DateTime<Utc>>,
) -> Plan {
    if floor.is_some_and(|floor| key.log_time <= floor) {
        return Plan::Skip(SkipReason::BeforeFloor);
    }

    let Some(prior) = prior else {
        return Plan::Dispatch(WorkItem {
            object: object.clone(),
            key: key.clone(),
            range: ByteRange::full(object),
            checkpoint: Checkpoint::new(object, key),
        });
    };

    if !prior.is_stale_for(object) {
        return Plan::Skip(SkipReason::Unchanged);
    }

    let length = object.content_length;
    let mut start = prior.last_processed_byte_offset;
    if start > length {
        warn!(
            key = %object.key,
            offset = start,
            length,
            "Object shrank since last run, reading from the start"
        );
        start = 0;
    }

    if start == length {
        let mut checkpoint = prior.clone();
        checkpoint.refresh_metadata(object);
        return Plan::Refresh(checkpoint);
    }

    Plan::Dispatch(WorkItem {
        object: object.clone(),
        key: key.clone(),
        range: ByteRange::new(start, length),
        checkpoint: prior.clone(),
    })
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub name: String,
    pub record_kind: RecordKind,
    pub prefix: String,
    /// Objects processed at once. Zero is treated as one.
    pub concurrency: usize,
    /// Objects whose hour bucket is not after this time are ignored.
    pub begin_time: Option<DateTime<Utc>>,
    pub data_dir: PathBuf,
}

/// Summary of one job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discovered: usize,
    pub malformed_keys: usize,
    pub before_floor: usize,
    pub unchanged: usize,
    pub refreshed: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
    pub events: usize,
    pub normalize_errors: usize,
}

impl JobReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            discovered: 0,
            malformed_keys: 0,
            before_floor: 0,
            unchanged: 0,
            refreshed: 0,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
            records: 0,
            events: 0,
            normalize_errors: 0,
        }
    }

    fn add(&mut self, outcome: ProcessOutcome) {
        self.succeeded += 1;
        self.records += outcome.records;
        self.events += outcome.events;
        self.normalize_errors += outcome.normalize_errors;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
}

/// State exposed to the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub last_report: Option<JobReport>,
    pub last_error: Option<String>,
    pub checkpoints: CheckpointStore,
}

/// Counts task failures and stops logging them individually once the budget is spent.
struct ErrorBudget {
    limit: usize,
    count: usize,
}

impl ErrorBudget {
    fn new(limit: usize) -> Self {
        Self { limit, count: 0 }
    }

    fn record(&mut self, key: &str, err: &dyn fmt::Display) {
        self.count += 1;
        if self.count <= self.limit {
            error!(key = %key, error = %err, "Failed to process object");
        } else if self.count == self.limit + 1 {
            error!(
                limit = self.limit,
                "Error budget exhausted, further failures this run are only counted"
            );
        }
    }
}

/// A named harvest: discovers objects, processes the changed ones through a
/// sink, and persists the merged checkpoints. Runs of the same job never overlap.
pub struct HarvestJob {
    options: JobOptions,
    store: Arc<dyn BlobStore>,
    sink: Arc<dyn Sink>,
    run_lock: Mutex<()>,
    status: RwLock<JobStatus>,
}

impl HarvestJob {
    pub fn new(options: JobOptions, store: Arc<dyn BlobStore>, sink: Arc<dyn Sink>) -> Self {
        Self {
            options,
            store,
            sink,
            run_lock: Mutex::new(()),
            status: RwLock::new(JobStatus {
                state: JobState::Idle,
                last_report: None,
                last_error: None,
                checkpoints: CheckpointStore::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.sink.kind()
    }

    /// Events delivered by the job's sink since startup.
    pub fn emitted(&self) -> u64 {
        self.sink.emitted()
    }

    pub async fn status(&self) -> JobStatus {
        self.status.read().await.clone()
    }

    /// Run once: discover, filter, dispatch, drain, commit. A concurrent call
    /// waits for the current run to finish.
    pub async fn run(&self) -> Result<JobReport, JobError> {
        let _guard = self.run_lock.lock().await;
        self.status.write().await.state = JobState::Running;
        info!(job = %self.options.name, sink = %self.sink.kind(), "Starting harvest run");

        let result = self.run_locked().await;

        let mut status = self.status.write().await;
        status.state = JobState::Idle;
        match &result {
            Ok((report, checkpoints)) => {
                status.last_report = Some(report.clone());
                status.last_error = None;
                status.checkpoints = checkpoints.clone();
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }
        result.map(|(report, _)| report)
    }

    async fn run_locked(&self) -> Result<(JobReport, CheckpointStore), JobError> {
        let mut report = JobReport::new(Utc::now());
        let sink_name = self.sink.kind().as_str();
        let prior = CheckpointStore::load(&self.options.data_dir, sink_name)?;

        // Discover
        let objects = self
            .store
            .list_objects(&self.options.prefix)
            .await
            .map_err(|source| JobError::Listing {
                prefix: self.options.prefix.clone(),
                source,
            })?;
        report.discovered = objects.len();

        // Filter
        let mut merged = prior.clone();
        let mut items = Vec::new();
        for object in &objects {
            let key = match ObjectKey::parse(&object.key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "Skipping object");
                    report.malformed_keys += 1;
                    continue;
                }
            };

            match classify(object, &key, prior.get(&object.key), self.options.begin_time) {
                Plan::Dispatch(item) => items.push(item),
                Plan::Refresh(checkpoint) => {
                    debug!(short_name = %key.short_name(), "No unread bytes");
                    merged.insert(checkpoint);
                    report.refreshed += 1;
                }
                Plan::Skip(SkipReason::Unchanged) => report.unchanged += 1,
                Plan::Skip(SkipReason::BeforeFloor) => report.before_floor += 1,
            }
        }
        report.dispatched = items.len();
        info!(
            job = %self.options.name,
            discovered = report.discovered,
            dispatched = report.dispatched,
            unchanged = report.unchanged,
            "Discovered objects"
        );

        // Drain: the only writer of the merged store while tasks run.
        let concurrency = self.options.concurrency.max(1);
        let (tx, mut rx) = results_channel(concurrency);
        let drain = tokio::spawn(async move {
            while let Some(checkpoint) = rx.recv().await {
                merged.insert(checkpoint);
            }
            merged
        });

        // Dispatch
        let mut budget = ErrorBudget::new(ERROR_BUDGET);
        {
            let mut tasks = stream::iter(items)
                .map(|item| {
                    let sink = Arc::clone(&self.sink);
                    let store = Arc::clone(&self.store);
                    let results = tx.clone();
                    let record_kind = self.options.record_kind;
                    let key = item.object.key.clone();
                    async move {
                        let handle = tokio::spawn(async move {
                            process(sink.as_ref(), store.as_ref(), record_kind, item, &results).await
                        });
                        (key, handle.await)
                    }
                })
                .buffer_unordered(concurrency);

            while let Some((key, joined)) = tasks.next().await {
                match joined {
                    Ok(Ok(outcome)) => report.add(outcome),
                    Ok(Err(e)) => {
                        report.failed += 1;
                        budget.record(&key, &e);
                    }
                    Err(e) => {
                        report.failed += 1;
                        budget.record(&key, &e);
                    }
                }
            }
        }
        drop(tx);

        // Commit
        let merged = drain.await?;
        merged.save(&self.options.data_dir, sink_name)?;

        report.finished_at = Some(Utc::now());
        info!(
            job = %self.options.name,
            succeeded = report.succeeded,
            failed = report.failed,
            events = report.events,
            checkpoints = merged.len(),
            "Harvest run complete"
        );
        Ok((report, merged))
    }
}
