//! Persistent metadata cache
//!
//! Maps video ids to extracted [`VideoRecord`]s so repeated runs skip the slow
//! extraction step. Every `set` rewrites the whole store (write-through); writers
//! are serialized by a single async mutex held across modify and persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::VideoRecord;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheEntry {
    record: VideoRecord,
    stored_at: DateTime<Utc>,
}

/// Key to record store backed by a single file
pub struct MetadataCache {
    /// Backing file (None = memory only)
    path: Option<PathBuf>,
    /// Entries older than this are reported as misses
    max_age: Option<Duration>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MetadataCache {
    /// Open the cache described by `config`
    ///
    /// A missing file yields an empty cache. A corrupt file is logged and
    /// ignored; it is overwritten by the next `set`.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::in_memory());
        }
        Self::load(&config.path, config.max_age).await
    }

    /// Load the cache stored at `path`
    pub async fn load(path: &Path, max_age: Option<Duration>) -> Result<Self> {
        let entries = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, CacheEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Metadata cache is unreadable, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Metadata cache loaded");

        Ok(Self {
            path: Some(path.to_path_buf()),
            max_age,
            entries: Mutex::new(entries),
        })
    }

    /// A cache that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_age: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a record by video id
    pub async fn get(&self, id: &str) -> Option<VideoRecord> {
        let entries = self.entries.lock().await;
        let entry = entries.get(id)?;

        if let Some(max_age) = self.max_age {
            let age = Utc::now()
                .signed_duration_since(entry.stored_at)
                .to_std()
                .unwrap_or_default();
            if age > max_age {
                tracing::debug!(video_id = id, age_secs = age.as_secs(), "Cache entry expired");
                return None;
            }
        }

        Some(entry.record.clone())
    }

    /// Store a record and persist the whole cache immediately
    pub async fn set(&self, id: &str, record: VideoRecord) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            id.to_string(),
            CacheEntry {
                record,
                stored_at: Utc::now(),
            },
        );

        let Some(path) = &self.path else {
            return Ok(());
        };
        persist(path, &entries).await
    }

    /// Number of cached records
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no records
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Write to a sibling temp file and rename over the store
async fn persist(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec(entries)?;
    let tmp = crate::utils::partial_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
