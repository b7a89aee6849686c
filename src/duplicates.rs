//! Duplicate detection against the download directory
//!
//! The index is seeded once from a recursive scan of the destination tree and
//! updated as artifacts are written. A video counts as downloaded when its id or
//! sanitized title is a known key, or when `{sanitized_title}.{ext}` exists on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Reduce a title to a filesystem-safe stem
///
/// Keeps alphanumerics, space, `.`, `_` and `-`, drops everything else and
/// trims surrounding whitespace. Idempotent.
///
/// # Examples
///
/// ```
/// use media_dl::duplicates::sanitize_filename;
///
/// assert_eq!(sanitize_filename("  AC/DC: Live! (2024) "), "ACDC Live 2024");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Set of known artifact keys under the download directory
pub struct DuplicateIndex {
    root: PathBuf,
    extensions: Vec<String>,
    keys: RwLock<HashSet<String>>,
}

impl DuplicateIndex {
    /// Scan `root` recursively for media files and index their stems
    ///
    /// Hidden directories (including segment temp dirs) are not descended into.
    pub async fn scan(root: &Path, extensions: &[String]) -> Result<Self> {
        let scan_root = root.to_path_buf();
        let scan_extensions = extensions.to_vec();

        let keys = tokio::task::spawn_blocking(move || collect_stems(&scan_root, &scan_extensions))
            .await
            .map_err(|e| Error::Other(format!("duplicate scan task failed: {e}")))?;

        tracing::info!(
            root = %root.display(),
            known = keys.len(),
            "Indexed existing downloads"
        );

        Ok(Self {
            root: root.to_path_buf(),
            extensions: extensions.to_vec(),
            keys: RwLock::new(keys),
        })
    }

    /// An index with no known keys
    pub fn empty(root: &Path, extensions: &[String]) -> Self {
        Self {
            root: root.to_path_buf(),
            extensions: extensions.to_vec(),
            keys: RwLock::new(HashSet::new()),
        }
    }

    /// Whether a video with this id or title was already downloaded
    pub async fn is_downloaded(&self, id: Option<&str>, title: &str) -> bool {
        let clean = sanitize_filename(title);
        {
            let keys = self.keys.read().await;
            if id.is_some_and(|id| keys.contains(id)) {
                return true;
            }
            if !clean.is_empty() && keys.contains(&clean) {
                return true;
            }
        }

        if clean.is_empty() {
            return false;
        }

        for ext in &self.extensions {
            let candidate = self.root.join(format!("{clean}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }

    /// Record a finished download under its id and sanitized title
    pub async fn mark_downloaded(&self, id: Option<&str>, title: &str) {
        let clean = sanitize_filename(title);
        let mut keys = self.keys.write().await;
        if let Some(id) = id {
            keys.insert(id.to_string());
        }
        if !clean.is_empty() {
            keys.insert(clean);
        }
    }

    /// Number of known keys
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Whether no keys are known
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

fn collect_stems(root: &Path, extensions: &[String]) -> HashSet<String> {
    let mut keys = HashSet::new();
    if !root.exists() {
        return keys;
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let recognized = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)));
        if !recognized {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            keys.insert(stem.to_string());
        }
    }
    keys
}
