use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid range {start}..{end} for object '{key}' of length {length}")]
    InvalidRange {
        key: String,
        start: u64,
        end: u64,
        length: u64,
    },

    #[error("failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A remote, append-only log object as reported by the store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    pub key: String,
    pub content_length: u64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn full(object: &SourceObject) -> Self {
        Self::new(0, object.content_length)
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Minimal contract of the blob store the harvester reads from.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Enumerate every object whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<SourceObject>, TransportError>;

    /// Read the bytes of `range` from `object`.
    async fn get_range(
        &self,
        object: &SourceObject,
        range: ByteRange,
    ) -> Result<Vec<u8>, TransportError>;
}

pub(crate) fn check_range(
    key: &str,
    range: ByteRange,
    length: u64,
) -> Result<(), TransportError> {
    if range.start > range.end || range.end > length {
        return Err(TransportError::InvalidRange {
            key: key.to_string(),
            start: range.start,
            end: range.end,
            length,
        });
    }
    Ok(())
}
