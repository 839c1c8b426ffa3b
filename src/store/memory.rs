use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};

use super::{segments, RemoteStore};
use crate::error::StoreError;

/// Most recent calls kept for inspection
pub const CALL_LOG_CAPACITY: usize = 256;

/// One call seen by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub method: &'static str,
    pub path: String,
}

#[derive(Debug, Default)]
struct Inner {
    tree: Value,
    push_counter: u64,
    calls: VecDeque<StoreCall>,
    offline: bool,
    rejected_writes: HashSet<String>,
}

/// In-process JSON tree with the same semantics as the HTTP transport.
///
/// Writing `null` deletes, empty objects collapse, and `post` keys sort in
/// insertion order. The last [`CALL_LOG_CAPACITY`] calls are kept for
/// inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `tree` at the root
    pub fn with_tree(tree: Value) -> Self {
        let store = Self::new();
        store.inner.lock().tree = tree;
        store
    }

    /// While offline every call fails with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Make every write aimed exactly at `path` fail with a transport error
    pub fn reject_writes_to(&self, path: &str) {
        self.inner
            .lock()
            .rejected_writes
            .insert(path.trim_matches('/').to_string());
    }

    /// Snapshot of the document at `path`
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        let inner = self.inner.lock();
        lookup(&inner.tree, path).cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Children under `path` in key order (for pushed collections)
    pub fn children(&self, path: &str) -> Vec<Value> {
        match self.snapshot(path) {
            Some(Value::Object(map)) => map.into_values().collect(),
            _ => Vec::new(),
        }
    }

    fn begin(&self, method: &'static str, path: &str) -> Result<parking_lot::MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.inner.lock();
        if inner.calls.len() == CALL_LOG_CAPACITY {
            inner.calls.pop_front();
        }
        inner.calls.push_back(StoreCall {
            method,
            path: path.to_string(),
        });

        if inner.offline {
            return Err(StoreError::Transport {
                method,
                path: path.to_string(),
                details: "network unreachable".to_string(),
            });
        }

        if method != "GET" && inner.rejected_writes.contains(path.trim_matches('/')) {
            return Err(StoreError::Transport {
                method,
                path: path.to_string(),
                details: "write rejected".to_string(),
            });
        }

        Ok(inner)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.begin("GET", path)?;
        Ok(lookup(&inner.tree, path).cloned())
    }

    async fn put(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        let mut inner = self.begin("PUT", path)?;
        write(&mut inner.tree, path, doc.clone());
        Ok(())
    }

    async fn post(&self, path: &str, doc: &Value) -> Result<String, StoreError> {
        let mut inner = self.begin("POST", path)?;
        inner.push_counter += 1;
        let key = format!("-M{:019}", inner.push_counter);
        let child = format!("{}/{}", path.trim_end_matches('/'), key);
        write(&mut inner.tree, &child, doc.clone());
        Ok(key)
    }

    async fn patch(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        let mut inner = self.begin("PATCH", path)?;

        let Value::Object(fields) = doc else {
            return Err(StoreError::Malformed {
                path: path.to_string(),
                details: "patch body must be an object".to_string(),
            });
        };

        for (key, value) in fields {
            let child = format!("{}/{}", path.trim_end_matches('/'), key);
            write(&mut inner.tree, &child, value.clone());
        }
        Ok(())
    }
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = tree;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    (!node.is_null()).then_some(node)
}

fn write(tree: &mut Value, path: &str, mut doc: Value) {
    prune(&mut doc);
    let parts: Vec<&str> = segments(path).collect();
    if parts.is_empty() {
        *tree = doc;
        return;
    }
    set_at(tree, &parts, doc);
}

/// Place `doc` at `parts` below `node`, collapsing ancestors on that path
/// only. Returns whether `node` was left empty.
fn set_at(node: &mut Value, parts: &[&str], doc: Value) -> bool {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let (Value::Object(map), Some((head, rest))) = (node, parts.split_first()) else {
        return false;
    };

    if rest.is_empty() {
        if is_empty(&doc) {
            map.remove(*head);
        } else {
            map.insert(head.to_string(), doc);
        }
    } else {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        if set_at(child, rest, doc) {
            map.remove(*head);
        }
    }
    map.is_empty()
}

fn is_empty(node: &Value) -> bool {
    match node {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop empty objects, the way the real database never stores them
fn prune(node: &mut Value) {
    if let Value::Object(map) = node {
        for child in map.values_mut() {
            prune(child);
        }
        map.retain(|_, child| !is_empty(child));
    }
}
