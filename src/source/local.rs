use super::object::{check_range, BlobStore, ByteRange, SourceObject, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Blob store backed by a local directory. Keys are the `/`-joined paths of
/// regular files relative to the root, e.g. a mounted or synced container.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }
}

fn describe(key: String, metadata: &Metadata) -> SourceObject {
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
    let last_modified: DateTime<Utc> = modified.into();
    let mut hasher = Sha256::new();
    hasher.update(metadata.len().to_be_bytes());
    hasher.update(last_modified.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = hasher.finalize();
    let etag = digest[..8]
        .iter()
        .fold(String::from("0x"), |mut s, b| {
            s.push_str(&format!("{:02X}", b));
            s
        });

    SourceObject {
        key,
        content_length: metadata.len(),
        etag,
        last_modified,
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<SourceObject>, TransportError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                let path = entry.path();
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    objects.push(describe(key, &metadata));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(root = %self.root.display(), prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn get_range(
        &self,
        object: &SourceObject,
        range: ByteRange,
    ) -> Result<Vec<u8>, TransportError> {
        let path = self.path_for(&object.key);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(object.key.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let length = file.metadata().await?.len();
        check_range(&object.key, range, length)?;

        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; range.len() as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
