use crate::cef::frame_syslog_line;
use crate::config::load_config;
use crate::record::{EventOptions, RecordKind};
use crate::source::decoder::DecodeError;
use crate::source::object::{BlobStore, ByteRange, TransportError};
use crate::source::LocalBlobStore;
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("no object with key '{0}'")]
    NotFound(String),

    #[error("offset {start} is past the end of '{key}' ({length} bytes)")]
    OffsetPastEnd { key: String, start: u64, length: u64 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Byte offset to start reading at.
    pub start: u64,
    /// Frame lines the way the syslog sink does, using this hostname.
    pub syslog_hostname: Option<String>,
}

pub async fn inspect(
    config_path: Option<PathBuf>,
    key: &str,
    options: InspectOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::run::require_config_path(config_path);
    let config = load_config(&config_path)?;
    let store = LocalBlobStore::new(config.source.root.clone());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let events = inspect_object(&store, config.source.kind, key, &options, &mut out).await?;
    info!(key = %key, events, "Inspected object");
    Ok(())
}

/// Decode one object and write its CEF wire lines to `out`. Checkpoints are
/// neither read nor written. Returns the number of lines written.
pub async fn inspect_object(
    store: &dyn BlobStore,
    kind: RecordKind,
    key: &str,
    options: &InspectOptions,
    out: &mut impl Write,
) -> Result<usize, InspectError> {
    let object = store
        .list_objects(key)
        .await?
        .into_iter()
        .find(|object| object.key == key)
        .ok_or_else(|| InspectError::NotFound(key.to_string()))?;

    if options.start >= object.content_length {
        return Err(InspectError::OffsetPastEnd {
            key: key.to_string(),
            start: options.start,
            length: object.content_length,
        });
    }

    let range = ByteRange::new(options.start, object.content_length);
    let bytes = store.get_range(&object, range).await?;
    let batch = kind.decode_events(&bytes, &EventOptions::default())?;

    for error in &batch.errors {
        warn!(key = %key, error = %error, "Skipped malformed input");
    }

    for event in &batch.events {
        let line = event.wire_line();
        match &options.syslog_hostname {
            Some(hostname) => writeln!(out, "{}", frame_syslog_line(hostname, &line, Utc::now()))?,
            None => writeln!(out, "{}", line)?,
        }
    }
    out.flush()?;

    Ok(batch.events.len())
}
