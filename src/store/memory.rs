use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{DocumentBackend, StorePath};
use crate::error::{CoreError, CoreResult};

/// In-process document tree with the remote store's storage rules: nulls and
/// empty mappings are pruned after every write, so they read back as absent.
#[derive(Debug)]
pub struct MemoryBackend {
    tree: Mutex<Value>,
    writes: AtomicUsize,
    available: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Value::Object(Map::new())),
            writes: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Number of mutating calls received (put, patch, delete).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Raw copy of the whole tree, sentinels included.
    pub fn snapshot(&self) -> Value {
        self.tree.lock().map(|t| t.clone()).unwrap_or(Value::Null)
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::unavailable("memory backend offline"))
        }
    }

    fn with_tree<T>(&self, f: impl FnOnce(&mut Value) -> CoreResult<T>) -> CoreResult<T> {
        let mut tree = self
            .tree
            .lock()
            .map_err(|_| CoreError::unavailable("memory backend poisoned"))?;
        f(&mut *tree)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(tree: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Walk to `path`, turning missing or scalar intermediates into mappings.
fn slot<'a>(tree: &'a mut Value, path: &StorePath) -> &'a mut Value {
    let mut node = tree;
    for segment in path.segments() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            break;
        };
        node = map.entry(segment.clone()).or_insert(Value::Null);
    }
    node
}

fn prune(value: &mut Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => {
            map.retain(|_, v| !prune(v));
            map.is_empty()
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                if prune(item) {
                    *item = Value::Null;
                }
            }
            items.iter().all(Value::is_null)
        }
        _ => false,
    }
}

fn prune_root(tree: &mut Value) {
    if prune(tree) {
        *tree = Value::Object(Map::new());
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn get(&self, path: &StorePath) -> CoreResult<Option<Value>> {
        self.check_available()?;
        self.with_tree(|tree| {
            Ok(lookup(tree, path).filter(|v| match v {
                Value::Null => false,
                Value::Object(map) => !map.is_empty(),
                _ => true,
            }).cloned())
        })
    }

    async fn put(&self, path: &StorePath, value: &Value) -> CoreResult<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.with_tree(|tree| {
            *slot(tree, path) = value.clone();
            prune_root(tree);
            Ok(())
        })
    }

    async fn patch(&self, path: &StorePath, value: &Map<String, Value>) -> CoreResult<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.with_tree(|tree| {
            let target = slot(tree, path);
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let Some(existing) = target.as_object_mut() else {
                return Err(CoreError::invalid(format!(
                    "update target {} is not a mapping",
                    path
                )));
            };
            for (k, v) in value {
                existing.insert(k.clone(), v.clone());
            }
            prune_root(tree);
            Ok(())
        })
    }

    async fn delete(&self, path: &StorePath) -> CoreResult<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.with_tree(|tree| {
            if path.is_root() {
                *tree = Value::Object(Map::new());
            } else if lookup(tree, path).is_some() {
                *slot(tree, path) = Value::Null;
                prune_root(tree);
            }
            Ok(())
        })
    }

    async fn ping(&self) -> CoreResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_empty_containers_read_as_absent() {
        let backend = MemoryBackend::new();
        backend.put(&p("a/b"), &json!({})).await.unwrap();
        assert_eq!(backend.get(&p("a/b")).await.unwrap(), None);
        assert_eq!(backend.get(&p("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_parents() {
        let backend = MemoryBackend::new();
        backend.put(&p("a/b/c"), &json!(1)).await.unwrap();
        backend.delete(&p("a/b/c")).await.unwrap();
        assert_eq!(backend.get(&p("a")).await.unwrap(), None);
        assert_eq!(backend.writes(), 2);
    }

    #[tokio::test]
    async fn test_patch_on_scalar_rejected() {
        let backend = MemoryBackend::new();
        backend.put(&p("a"), &json!(5)).await.unwrap();
        let mut partial = Map::new();
        partial.insert("x".into(), json!(1));
        assert!(backend.patch(&p("a"), &partial).await.is_err());
    }

    #[tokio::test]
    async fn test_array_index_lookup() {
        let backend = MemoryBackend::new();
        backend.put(&p("poll/options"), &json!(["a", "b"])).await.unwrap();
        assert_eq!(backend.get(&p("poll/options/1")).await.unwrap(), Some(json!("b")));
    }
}
