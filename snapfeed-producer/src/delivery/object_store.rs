//! Object-store archive sink
//!
//! Each batch becomes one JSON-array object under
//! `{prefix}/{YYYY-MM-DD}/batch_{epoch_ms}.json`. Objects are written once and
//! never overwritten, and a failed write leaves nothing at the key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snapfeed_common::time::{date_partition, now};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{DeliverySink, PutBatchResponse};
use crate::error::SinkError;
use crate::types::EnrichedRecord;

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "raw";

/// Write-once blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store description for logs
    fn describe(&self) -> String;

    /// Store `body` under `key`; fails if the key already exists
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), SinkError>;
}

/// Filesystem-backed object store rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::TransportFailure(format!("{}: {}", parent.display(), e)))?;
        }

        // The object only appears at its key once fully written
        let staging = staging_path(&path);
        if let Err(e) = write_staged(&staging, &body).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SinkError::TransportFailure(format!("{}: {}", staging.display(), e)));
        }

        let published = tokio::fs::hard_link(&staging, &path).await;
        let _ = tokio::fs::remove_file(&staging).await;
        published.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                SinkError::TransportFailure(format!("object already exists: {}", key))
            }
            _ => SinkError::TransportFailure(format!("{}: {}", path.display(), e)),
        })?;

        debug!(path = %path.display(), bytes = body.len(), "Wrote object");
        Ok(())
    }
}

/// Hidden sibling the object body is written to before it is linked at its key
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}

async fn write_staged(staging: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await
}

/// Delivery sink archiving each batch as one object
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    display_name: String,
    last_key_ms: AtomicI64,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        let display_name = format!("object-store:{}", store.describe());
        Self {
            store,
            prefix,
            display_name,
            last_key_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Key for a batch written at `at`
    ///
    /// The millisecond component strictly increases across calls on one sink,
    /// so batches written within the same millisecond get distinct keys.
    pub fn object_key(&self, at: DateTime<Utc>) -> String {
        let wanted = at.timestamp_millis();
        let previous = self
            .last_key_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wanted.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        let millis = wanted.max(previous.saturating_add(1));

        let file = format!("{}/batch_{}.json", date_partition(at), millis);
        if self.prefix.is_empty() {
            file
        } else {
            format!("{}/{}", self.prefix, file)
        }
    }
}

#[async_trait]
impl DeliverySink for ObjectStoreSink {
    fn name(&self) -> &str {
        &self.display_name
    }

    async fn put_batch(&self, records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError> {
        let body = serde_json::to_vec(records)
            .map_err(|e| SinkError::TransportFailure(format!("encoding batch: {}", e)))?;
        let key = self.object_key(now());

        self.store.put_object(&key, body).await?;

        debug!(key = %key, records = records.len(), "Archived batch");
        Ok(PutBatchResponse::all_accepted(records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sink(prefix: &str) -> ObjectStoreSink {
        ObjectStoreSink::new(Arc::new(LocalObjectStore::new("/tmp/unused")), prefix)
    }

    #[test]
    fn test_key_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            sink("raw").object_key(at),
            format!("raw/2024-03-09/batch_{}.json", at.timestamp_millis())
        );
    }

    #[test]
    fn test_prefix_slashes_are_trimmed() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let key = sink("/archive/web/").object_key(at);
        assert!(key.starts_with("archive/web/2024-03-09/batch_"));
        assert!(sink("").object_key(at).starts_with("2024-03-09/batch_"));
    }

    #[test]
    fn test_same_millisecond_keys_are_distinct() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let sink = sink("raw");
        let first = sink.object_key(at);
        let second = sink.object_key(at);
        let third = sink.object_key(at);
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(second.ends_with(&format!("batch_{}.json", at.timestamp_millis() + 1)));
    }
}
