use super::object::{check_range, BlobStore, ByteRange, SourceObject, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredBlob {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
    generation: u64,
}

/// In-process blob store standing in for the remote container.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an object.
    pub fn put(&self, key: &str, body: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        let generation = blobs.get(key).map(|b| b.generation + 1).unwrap_or(0);
        blobs.insert(
            key.to_string(),
            StoredBlob {
                body: body.into(),
                last_modified,
                generation,
            },
        );
    }

    /// Append bytes to an existing object (creating it if missing), the way the
    /// log source grows its hourly objects.
    pub fn append(&self, key: &str, bytes: &[u8], last_modified: DateTime<Utc>) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        let blob = blobs.entry(key.to_string()).or_insert_with(|| StoredBlob {
            body: Vec::new(),
            last_modified,
            generation: 0,
        });
        blob.body.extend_from_slice(bytes);
        blob.last_modified = last_modified;
        blob.generation += 1;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<SourceObject>, TransportError> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, blob)| SourceObject {
                key: key.clone(),
                content_length: blob.body.len() as u64,
                etag: format!("0x{:016X}", blob.generation),
                last_modified: blob.last_modified,
            })
            .collect())
    }

    async fn get_range(
        &self,
        object: &SourceObject,
        range: ByteRange,
    ) -> Result<Vec<u8>, TransportError> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        let blob = blobs
            .get(&object.key)
            .ok_or_else(|| TransportError::NotFound(object.key.clone()))?;
        check_range(&object.key, range, blob.body.len() as u64)?;
        Ok(blob.body[range.start as usize..range.end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_range() {
        let store = MemoryBlobStore::new();
        let now = Utc::now();
        store.put("a/one", "0123456789", now);
        store.put("b/two", "xyz", now);

        let listed = store.list_objects("a/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content_length, 10);

        let bytes = store.get_range(&listed[0], ByteRange::new(2, 5)).await.unwrap();
        assert_eq!(bytes, b"234");
    }

    #[tokio::test]
    async fn test_range_past_end_is_rejected() {
        let store = MemoryBlobStore::new();
        store.put("k", "abc", Utc::now());
        let object = store.list_objects("").await.unwrap().remove(0);

        let result = store.get_range(&object, ByteRange::new(1, 10)).await;
        assert!(matches!(result, Err(TransportError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_append_changes_etag() {
        let store = MemoryBlobStore::new();
        let now = Utc::now();
        store.append("k", b"abc", now);
        let before = store.list_objects("").await.unwrap().remove(0);
        store.append("k", b"def", now);
        let after = store.list_objects("").await.unwrap().remove(0);

        assert_ne!(before.etag, after.etag);
        assert_eq!(after.content_length, 6);
    }
}
