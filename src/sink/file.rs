use super::{Sink, SinkError, SinkKind};
use crate::pipeline::job::WorkItem;
use crate::record::EventBatch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Writes each object's new events as one JSON array into a directory.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    emitted: AtomicU64,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            emitted: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `nsgLog-<source>-YYYYMMDDHHMM-<first>-<last>.json`, where first and
    /// last are the unix seconds of the batch's earliest and latest events.
    pub fn file_name(item: &WorkItem, batch: &EventBatch) -> String {
        let first = batch.first_event_time().map_or(0, |t| t.timestamp());
        let last = batch.last_event_time().map_or(0, |t| t.timestamp());
        format!("{}-{}-{}.json", item.key.local_file_stem(), first, last)
    }
}

#[async_trait]
impl Sink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn emit(&self, item: &WorkItem, batch: &EventBatch) -> Result<(), SinkError> {
        let path = self.dir.join(Self::file_name(item, batch));
        let json = serde_json::to_vec_pretty(&batch.events)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| SinkError::Write {
                path: path.clone(),
                source,
            })?;

        self.emitted
            .fetch_add(batch.events.len() as u64, Ordering::Relaxed);
        info!(path = %path.display(), events = batch.events.len(), "Wrote events");
        Ok(())
    }

    fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
