use crate::source::naming::ObjectKey;
use crate::source::object::SourceObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STATUS_FILE_PREFIX: &str = "nsg-harvester-status";

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write checkpoint store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint store: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Processing progress for one object, as seen by one sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub key: String,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// Hour bucket parsed from the key.
    pub log_time: Option<DateTime<Utc>>,
    /// Wall clock time the checkpoint was written.
    pub last_processed: Option<DateTime<Utc>>,
    /// Dedup watermark: records at or before this time are never emitted again.
    pub last_processed_record_time: Option<DateTime<Utc>>,
    /// Unix seconds of the latest event emitted.
    pub last_processed_timestamp: i64,
    pub last_processed_byte_offset: u64,
    pub last_record_count: usize,
    pub source_name: String,
}

impl Checkpoint {
    /// Zero-valued checkpoint for an object seen for the first time.
    pub fn new(object: &SourceObject, key: &ObjectKey) -> Self {
        Self {
            key: object.key.clone(),
            etag: object.etag.clone(),
            last_modified: Some(object.last_modified),
            log_time: Some(key.log_time),
            source_name: key.source_name.clone(),
            ..Default::default()
        }
    }

    /// Refresh the object metadata without touching progress.
    pub fn refresh_metadata(&mut self, object: &SourceObject) {
        self.etag = object.etag.clone();
        self.last_modified = Some(object.last_modified);
    }

    /// Whether the object changed since this checkpoint was written.
    pub fn is_stale_for(&self, object: &SourceObject) -> bool {
        self.last_modified
            .map_or(true, |seen| object.last_modified > seen)
    }
}

/// Map of object key to checkpoint, persisted as one JSON file per sink kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointStore {
    entries: BTreeMap<String, Checkpoint>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_name(sink: &str) -> String {
        format!("{}-{}.json", STATUS_FILE_PREFIX, sink)
    }

    pub fn path(dir: &Path, sink: &str) -> PathBuf {
        dir.join(Self::file_name(sink))
    }

    pub fn get(&self, key: &str) -> Option<&Checkpoint> {
        self.entries.get(key)
    }

    /// Insert or replace the checkpoint under its own key.
    pub fn insert(&mut self, checkpoint: Checkpoint) -> Option<Checkpoint> {
        self.entries.insert(checkpoint.key.clone(), checkpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Checkpoint)> {
        self.entries.iter()
    }

    /// Load the store for `sink` from `dir`. A missing file is a first run and
    /// yields an empty store.
    pub fn load(dir: &Path, sink: &str) -> Result<Self> {
        let path = Self::path(dir, sink);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No checkpoint store found, starting fresh");
                return Ok(Self::new());
            }
            Err(source) => return Err(CheckpointError::Read { path, source }),
        };

        let mut store: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CheckpointError::Corrupt {
                path: path.clone(),
                source,
            })?;

        // The map key is authoritative; `insert` files checkpoints under
        // their inner key.
        for (key, checkpoint) in store.entries.iter_mut() {
            if checkpoint.key != *key {
                debug!(key = %key, stored = %checkpoint.key, "Checkpoint key differs from its entry");
                checkpoint.key = key.clone();
            }
        }

        info!(path = %path.display(), entries = store.len(), "Loaded checkpoint store");
        Ok(store)
    }

    /// Persist the store, replacing the previous file atomically.
    pub fn save(&self, dir: &Path, sink: &str) -> Result<PathBuf> {
        let path = Self::path(dir, sink);
        let tmp_path = path.with_extension("json.tmp");
        let write_err = |source: std::io::Error| CheckpointError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(write_err)?;

        let json = serde_json::to_vec_pretty(self)?;
        {
            let file = File::create(&tmp_path).map_err(write_err)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&json).map_err(write_err)?;
            writer.flush().map_err(write_err)?;
            writer.get_ref().sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp_path, &path).map_err(write_err)?;

        debug!(path = %path.display(), entries = self.len(), "Saved checkpoint store");
        Ok(path)
    }
}
