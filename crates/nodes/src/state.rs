//! Node-private key/value state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

/// State owned exclusively by one node.
///
/// `Node::process` takes `&self`, so the map sits behind a mutex. Cloning
/// copies the current contents: a cloned node never shares state with its
/// origin.
#[derive(Debug, Default)]
pub struct NodeState(Mutex<Map<String, Value>>);

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for NodeState {
    fn clone(&self) -> Self {
        Self(Mutex::new(self.snapshot()))
    }
}
