use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::CoreResult;
use crate::logging::log_store_op;

mod firebase;
mod memory;
pub mod path;
pub mod retry;

pub use firebase::FirebaseBackend;
pub use memory::MemoryBackend;
pub use path::{Paths, StorePath};

/// Key written in place of an empty mapping. Never visible above [`PathStore`].
pub const SENTINEL_KEY: &str = "_init";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Firebase,
    Memory,
}

impl BackendKind {
    pub fn from_env() -> Self {
        match std::env::var("STORE_BACKEND").unwrap_or_else(|_| "firebase".to_string()).as_str() {
            "memory" => BackendKind::Memory,
            _ => BackendKind::Firebase,
        }
    }

    pub fn build(self, cfg: &Config) -> anyhow::Result<Arc<dyn DocumentBackend + Send + Sync>> {
        match self {
            BackendKind::Firebase => Ok(Arc::new(FirebaseBackend::new(cfg)?)),
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        }
    }
}

/// Raw transport to the hierarchical store.
///
/// Backends see exactly what is transmitted: sentinel substitution has already
/// happened on the way down, and stripping happens on the way up.
#[async_trait]
pub trait DocumentBackend {
    async fn get(&self, path: &StorePath) -> CoreResult<Option<Value>>;
    async fn put(&self, path: &StorePath, value: &Value) -> CoreResult<()>;
    async fn patch(&self, path: &StorePath, value: &Map<String, Value>) -> CoreResult<()>;
    async fn delete(&self, path: &StorePath) -> CoreResult<()>;
    async fn ping(&self) -> CoreResult<()>;
}

/// Path-addressed document API with the empty-container guard.
#[derive(Clone)]
pub struct PathStore {
    backend: Arc<dyn DocumentBackend + Send + Sync>,
}

impl PathStore {
    pub fn new(backend: Arc<dyn DocumentBackend + Send + Sync>) -> Self {
        Self { backend }
    }

    /// Read the value at `path`; `None` when absent. Sentinel keys are removed at every depth,
    /// so a sentinel-only record reads back as an empty mapping, not as absent.
    pub async fn get(&self, path: &StorePath) -> CoreResult<Option<Value>> {
        let raw = self.backend.get(path).await?;
        log_store_op("get", &path.to_string(), false);
        Ok(raw.map(strip_sentinel))
    }

    pub async fn exists(&self, path: &StorePath) -> CoreResult<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// Unconditional replace.
    pub async fn set(&self, path: &StorePath, value: Value) -> CoreResult<()> {
        let value = guard_empty(value);
        self.backend.put(path, &value).await?;
        log_store_op("set", &path.to_string(), false);
        Ok(())
    }

    /// Shallow merge into the mapping at `path`. Merging nothing is skipped entirely.
    pub async fn update(&self, path: &StorePath, partial: Map<String, Value>) -> CoreResult<()> {
        if partial.is_empty() {
            log_store_op("update", &path.to_string(), true);
            return Ok(());
        }
        let partial = partial
            .into_iter()
            .map(|(k, v)| (k, guard_empty(v)))
            .collect::<Map<String, Value>>();
        self.backend.patch(path, &partial).await?;
        log_store_op("update", &path.to_string(), false);
        Ok(())
    }

    pub async fn delete(&self, path: &StorePath) -> CoreResult<()> {
        self.backend.delete(path).await?;
        log_store_op("delete", &path.to_string(), false);
        Ok(())
    }

    pub async fn ping(&self) -> CoreResult<()> {
        self.backend.ping().await
    }
}

pub fn sentinel() -> Value {
    let mut map = Map::new();
    map.insert(SENTINEL_KEY.to_string(), Value::Bool(true));
    Value::Object(map)
}

/// Replace every empty mapping in `value` (including `value` itself) with the sentinel.
fn guard_empty(value: Value) -> Value {
    match value {
        Value::Object(map) if map.is_empty() => sentinel(),
        Value::Object(map) => Value::Object(
            map.into_iter().map(|(k, v)| (k, guard_empty(v))).collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(guard_empty).collect()),
        other => other,
    }
}

fn strip_sentinel(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k != SENTINEL_KEY)
                .map(|(k, v)| (k, strip_sentinel(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_sentinel).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (Arc<MemoryBackend>, PathStore) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), PathStore::new(backend))
    }

    #[test]
    fn test_guard_empty_nested() {
        let guarded = guard_empty(json!({"a": {}, "b": {"c": {}}, "d": 1}));
        assert_eq!(guarded, json!({"a": {"_init": true}, "b": {"c": {"_init": true}}, "d": 1}));
        assert_eq!(guard_empty(json!({})), sentinel());
    }

    #[test]
    fn test_strip_sentinel_nested() {
        let stripped = strip_sentinel(json!({"_init": true, "x": {"_init": true, "y": 2}}));
        assert_eq!(stripped, json!({"x": {"y": 2}}));
    }

    #[tokio::test]
    async fn test_empty_write_stores_sentinel_and_reads_present() {
        let (backend, store) = store();
        let path = StorePath::parse("communities/1/users").unwrap();
        store.set(&path, json!({})).await.unwrap();

        assert_eq!(backend.get(&path).await.unwrap(), Some(sentinel()));
        assert_eq!(store.get(&path).await.unwrap(), Some(json!({})));
        assert!(store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_update_is_not_sent() {
        let (backend, store) = store();
        let path = StorePath::parse("communities/1/data").unwrap();
        store.update(&path, Map::new()).await.unwrap();

        assert_eq!(backend.writes(), 0);
        assert!(!store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_merges_shallow() {
        let (_, store) = store();
        let path = StorePath::parse("a").unwrap();
        store.set(&path, json!({"x": 1, "nested": {"k": 1}})).await.unwrap();
        let mut partial = Map::new();
        partial.insert("y".into(), json!(2));
        partial.insert("nested".into(), json!({"j": 2}));
        store.update(&path, partial).await.unwrap();

        assert_eq!(
            store.get(&path).await.unwrap(),
            Some(json!({"x": 1, "y": 2, "nested": {"j": 2}}))
        );
    }

    #[tokio::test]
    async fn test_unavailable_backend_propagates() {
        let (backend, store) = store();
        backend.set_available(false);
        let err = store.get(&StorePath::parse("a").unwrap()).await.unwrap_err();
        assert!(matches!(err, crate::error::CoreError::StoreUnavailable(_)));
    }
}
