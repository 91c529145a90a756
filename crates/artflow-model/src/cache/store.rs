//! In-memory response cache with optional JSON file persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::CacheKey;
use crate::chat::ModelParams;
use crate::error::{Error, Result};

/// Tracing target for cache operations.
const TRACING_TARGET: &str = "artflow_model::cache";

/// A cached set of responses to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identifier of the model that produced the responses.
    pub model_id: String,
    /// The prompt.
    pub prompt: String,
    /// Parameters of the request, including the system prompt and history.
    pub params: ModelParams,
    /// The responses.
    pub responses: Vec<String>,
    /// When the entry was stored.
    pub created_at: Timestamp,
    /// When the entry was last read or stored.
    pub accessed_at: Timestamp,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<(CacheKey, CacheEntry)>,
}

/// Which entries [`ResponseCache::clear`] evicts.
///
/// An entry is evicted if it matches every criterion that is set; an empty
/// filter evicts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearFilter {
    /// Only evict entries of this model.
    pub model_id: Option<String>,
    /// Only evict entries created before this time.
    pub created_before: Option<Timestamp>,
    /// Only evict entries last accessed before this time.
    pub accessed_before: Option<Timestamp>,
}

impl ClearFilter {
    /// Matches every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the filter to one model.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Restricts the filter to entries created before `time`.
    pub fn with_created_before(mut self, time: Timestamp) -> Self {
        self.created_before = Some(time);
        self
    }

    /// Restricts the filter to entries last accessed before `time`.
    pub fn with_accessed_before(mut self, time: Timestamp) -> Self {
        self.accessed_before = Some(time);
        self
    }

    fn matches(&self, entry: &CacheEntry) -> bool {
        self.model_id.as_deref().is_none_or(|id| id == entry.model_id)
            && self.created_before.is_none_or(|t| entry.created_at < t)
            && self.accessed_before.is_none_or(|t| entry.accessed_at < t)
    }
}

/// A cache of model responses, safe to share across concurrent tasks.
///
/// Lookups and updates are serialized behind an async mutex. A cache opened
/// from a file is written back by [`flush`](Self::flush).
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    path: Option<PathBuf>,
}

impl ResponseCache {
    /// Creates an empty in-memory cache.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a cache backed by a JSON file.
    ///
    /// The file is created on the first [`flush`](Self::flush) if it does
    /// not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: CacheFile = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::cache(format!("cannot read cache file {}: {e}", path.display()))
                })?;
                file.entries.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            target: TRACING_TARGET,
            path = %path.display(),
            entries = entries.len(),
            "Opened response cache"
        );

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up the responses to a request, updating its access time.
    pub async fn get(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Option<Vec<String>> {
        let key = CacheKey::new(model_id, prompt, params);
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&key)?;
        entry.accessed_at = Timestamp::now();

        tracing::trace!(target: TRACING_TARGET, key = %key, "Cache hit");
        Some(entry.responses.clone())
    }

    /// Stores the responses to a request, replacing any previous entry.
    pub async fn put(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
        responses: Vec<String>,
    ) {
        let key = CacheKey::new(model_id, prompt, params);
        let now = Timestamp::now();
        let entry = CacheEntry {
            model_id: model_id.to_owned(),
            prompt: prompt.to_owned(),
            params: params.clone(),
            responses,
            created_at: now,
            accessed_at: now,
        };

        tracing::trace!(target: TRACING_TARGET, key = %key, "Cache store");
        self.entries.lock().await.insert(key, entry);
    }

    /// Evicts the entries matching the filter and returns how many were
    /// removed.
    pub async fn clear(&self, filter: &ClearFilter) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !filter.matches(entry));
        let removed = before - entries.len();

        tracing::debug!(target: TRACING_TARGET, removed, "Cleared response cache");
        removed
    }

    /// Returns the number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Writes the cache to its backing file.
    ///
    /// Does nothing for an in-memory cache.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = {
            let entries = self.entries.lock().await;
            let mut entries: Vec<_> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            CacheFile { entries }
        };

        let bytes = serde_json::to_vec_pretty(&file)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            path = %path.display(),
            entries = file.entries.len(),
            "Flushed response cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params() -> ModelParams {
        let mut params = ModelParams::new();
        params.insert("temperature".into(), json!(0.0));
        params
    }

    #[tokio::test]
    async fn stores_and_returns_responses() {
        let cache = ResponseCache::in_memory();
        assert!(cache.get("m", "hi", &params()).await.is_none());

        cache.put("m", "hi", &params(), vec!["hello".into()]).await;
        assert_eq!(cache.get("m", "hi", &params()).await, Some(vec!["hello".into()]));
        assert!(cache.get("m", "hi", &ModelParams::new()).await.is_none());
    }

    #[tokio::test]
    async fn clear_filters_by_model_and_time() {
        let cache = ResponseCache::in_memory();
        cache.put("a", "p", &params(), vec!["1".into()]).await;
        cache.put("b", "p", &params(), vec!["2".into()]).await;

        let past = Timestamp::UNIX_EPOCH;
        assert_eq!(cache.clear(&ClearFilter::all().with_created_before(past)).await, 0);
        assert_eq!(cache.clear(&ClearFilter::all().with_model_id("a")).await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.clear(&ClearFilter::all()).await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("responses.json");

        let cache = ResponseCache::open(&path).await.unwrap();
        cache.put("m", "hi", &params(), vec!["hello".into()]).await;
        cache.flush().await.unwrap();

        let reopened = ResponseCache::open(&path).await.unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(
            reopened.get("m", "hi", &params()).await,
            Some(vec!["hello".into()])
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not json").unwrap();

        let error = ResponseCache::open(file.path()).await.unwrap_err();
        assert!(matches!(error, Error::Cache(_)));
    }
}
