pub mod file;
pub mod syslog;

pub use file::FileSink;
pub use syslog::{SyslogProtocol, SyslogSink};

use crate::pipeline::channel::ResultsSender;
use crate::pipeline::job::WorkItem;
use crate::record::{EventBatch, EventOptions, RecordKind};
use crate::source::decoder::DecodeError;
use crate::source::object::{BlobStore, TransportError};
use crate::storage::Checkpoint;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Normalize errors logged individually per object before the rest are only counted.
const LOGGED_NORMALIZE_ERRORS: usize = 5;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("results channel closed")]
    ResultsClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    File,
    Syslog,
}

impl SinkKind {
    /// Name used in logs and in the checkpoint store file name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::File => "file",
            SinkKind::Syslog => "syslog",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination for the events of one object.
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Deliver a non-empty batch. Called at most once per object per run.
    async fn emit(&self, item: &WorkItem, batch: &EventBatch) -> Result<(), SinkError>;

    /// Events delivered by this sink since it was created.
    fn emitted(&self) -> u64;
}

/// What happened to one object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub records: usize,
    pub events: usize,
    pub normalize_errors: usize,
}

/// Read the unprocessed range of an object, normalize it, filter it against
/// the watermark, emit it and report the advanced checkpoint on `results`.
///
/// Any error leaves the object's checkpoint untouched, so the same range is
/// read again on the next run.
pub async fn process(
    sink: &dyn Sink,
    store: &dyn BlobStore,
    record_kind: RecordKind,
    item: WorkItem,
    results: &ResultsSender,
) -> Result<ProcessOutcome, SinkError> {
    let short_name = item.key.short_name();
    info!(
        key = %item.object.key,
        short_name = %short_name,
        sink = %sink.kind(),
        start = item.range.start,
        end = item.range.end,
        "Processing object"
    );

    let bytes = store.get_range(&item.object, item.range).await?;
    let options = EventOptions::after(item.checkpoint.last_processed_record_time);
    let batch = record_kind.decode_events(&bytes, &options)?;

    for error in batch.errors.iter().take(LOGGED_NORMALIZE_ERRORS) {
        warn!(short_name = %short_name, error = %error, "Skipped malformed input");
    }
    if batch.errors.len() > LOGGED_NORMALIZE_ERRORS {
        warn!(
            short_name = %short_name,
            count = batch.errors.len(),
            "More malformed input skipped"
        );
    }

    if batch.is_empty() {
        debug!(short_name = %short_name, records = batch.record_count, "No new events");
    } else {
        sink.emit(&item, &batch).await?;
    }

    let outcome = ProcessOutcome {
        records: batch.record_count,
        events: batch.events.len(),
        normalize_errors: batch.errors.len(),
    };
    let checkpoint = advance(item, &batch);
    info!(
        short_name = %short_name,
        sink = %sink.kind(),
        records = outcome.records,
        events = outcome.events,
        offset = checkpoint.last_processed_byte_offset,
        "Processed object"
    );

    results
        .send(checkpoint)
        .await
        .map_err(|_| SinkError::ResultsClosed)?;
    Ok(outcome)
}

/// Checkpoint after the batch of `item` has been delivered.
fn advance(item: WorkItem, batch: &EventBatch) -> Checkpoint {
    let mut checkpoint = item.checkpoint;
    checkpoint.refresh_metadata(&item.object);
    checkpoint.last_processed = Some(Utc::now());
    checkpoint.last_processed_byte_offset = item.range.end;
    checkpoint.last_record_count = batch.record_count;
    checkpoint.last_processed_record_time = checkpoint
        .last_processed_record_time
        .max(batch.watermark);
    if let Some(last) = batch.last_event_time() {
        checkpoint.last_processed_timestamp = last.timestamp();
    }
    checkpoint
}
