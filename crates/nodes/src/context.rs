//! Per-execution scratchpad and audit log.
//!
//! A [`Context`] is created once per top-level task. Workflows hand every
//! node of a traversal wave its own [`Context::fork`]: forks share the log,
//! metadata and cancellation token of their parent but carry a private copy
//! of short-term memory, so nodes of one wave never observe each other's
//! writes. The workflow commits each fork's writes back once the wave ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Pending short-term memory writes of a fork; `None` marks a removal.
pub type MemoryWrites = IndexMap<String, Option<Value>>;

// ---------------------------------------------------------------------------
// ExecutionRecord
// ---------------------------------------------------------------------------

/// One entry of the append-only execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    /// Workflow that invoked the node.
    pub workflow: String,
    pub node_id: String,
    /// SHA-256 of the node's output, see [`fingerprint`].
    pub fingerprint: String,
    /// Short-term memory exactly as it was when the record was appended.
    pub memory: Map<String, Value>,
}

/// Hex SHA-256 of the canonical JSON encoding of `value`.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Shared {
    log: Vec<ExecutionRecord>,
    active: IndexSet<String>,
    metadata: Map<String, Value>,
    charged: f64,
    output: Option<Value>,
}

#[derive(Debug, Default, Clone)]
struct Scratch {
    values: Map<String, Value>,
    writes: MemoryWrites,
}

/// Mutable state visible to every node of one execution.
#[derive(Debug)]
pub struct Context {
    id: Uuid,
    created_at: DateTime<Utc>,
    shared: Arc<Mutex<Shared>>,
    scratch: Mutex<Scratch>,
    cancel: CancellationToken,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Fresh context with a new random identifier.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            shared: Arc::default(),
            scratch: Mutex::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wave-scoped view: same log, metadata and cancellation, private copy
    /// of short-term memory with an empty write set.
    pub fn fork(&self) -> Context {
        let values = lock(&self.scratch).values.clone();
        Context {
            id: self.id,
            created_at: self.created_at,
            shared: Arc::clone(&self.shared),
            scratch: Mutex::new(Scratch { values, writes: MemoryWrites::new() }),
            cancel: self.cancel.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Short-term memory
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.scratch).values.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut scratch = lock(&self.scratch);
        scratch.values.insert(key.clone(), value.clone());
        scratch.writes.insert(key, Some(value));
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut scratch = lock(&self.scratch);
        let previous = scratch.values.remove(key);
        scratch.writes.insert(key.to_owned(), None);
        previous
    }

    /// Copy of short-term memory as of now.
    pub fn memory(&self) -> Map<String, Value> {
        lock(&self.scratch).values.clone()
    }

    /// Drain the writes made through this context since it was created or
    /// last drained.
    pub fn take_writes(&self) -> MemoryWrites {
        std::mem::take(&mut lock(&self.scratch).writes)
    }

    /// Replay `writes` onto this context (they count as writes here too, so
    /// they keep bubbling up through nested forks).
    pub fn apply_writes(&self, writes: MemoryWrites) {
        for (key, value) in writes {
            match value {
                Some(value) => self.set(key, value),
                None => {
                    self.remove(&key);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execution log
    // -----------------------------------------------------------------------

    /// Append a record for `node_id`, snapshotting short-term memory now.
    pub fn append_record(&self, workflow: &str, node_id: &str, output: &Value) {
        let record = ExecutionRecord {
            timestamp: Utc::now(),
            workflow: workflow.to_owned(),
            node_id: node_id.to_owned(),
            fingerprint: fingerprint(output),
            memory: self.memory(),
        };
        lock(&self.shared).log.push(record);
    }

    /// Copy of the log.
    pub fn log(&self) -> Vec<ExecutionRecord> {
        lock(&self.shared).log.clone()
    }

    pub fn log_len(&self) -> usize {
        lock(&self.shared).log.len()
    }

    // -----------------------------------------------------------------------
    // Active nodes
    // -----------------------------------------------------------------------

    pub fn mark_active(&self, node_id: &str) {
        lock(&self.shared).active.insert(node_id.to_owned());
    }

    pub fn mark_inactive(&self, node_id: &str) {
        lock(&self.shared).active.shift_remove(node_id);
    }

    pub fn active_nodes(&self) -> Vec<String> {
        lock(&self.shared).active.iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Metadata, cost, final output
    // -----------------------------------------------------------------------

    pub fn metadata(&self, key: &str) -> Option<Value> {
        lock(&self.shared).metadata.get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        lock(&self.shared).metadata.insert(key.into(), value);
    }

    /// Push `value` onto the array stored under `key`.
    pub fn push_metadata(&self, key: &str, value: Value) {
        let mut shared = lock(&self.shared);
        let slot = shared
            .metadata
            .entry(key.to_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![other.take(), value]),
        }
    }

    pub fn all_metadata(&self) -> Map<String, Value> {
        lock(&self.shared).metadata.clone()
    }

    /// Report cost incurred by the calling node (tokens, money, whatever the
    /// caller measures in).
    pub fn charge(&self, cost: f64) {
        lock(&self.shared).charged += cost;
    }

    /// Total cost charged so far across the whole execution.
    pub fn charged(&self) -> f64 {
        lock(&self.shared).charged
    }

    pub fn set_output(&self, output: Value) {
        lock(&self.shared).output = Some(output);
    }

    /// Final output recorded by whoever drove the execution.
    pub fn output(&self) -> Option<Value> {
        lock(&self.shared).output.clone()
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Request cancellation; honoured at the next wave boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fork_isolates_memory_but_shares_log() {
        let ctx = Context::new();
        ctx.set("seed", json!(1));

        let fork = ctx.fork();
        fork.set("seed", json!(2));
        fork.append_record("wf", "a", &json!({}));

        assert_eq!(ctx.get("seed"), Some(json!(1)));
        assert_eq!(fork.get("seed"), Some(json!(2)));
        assert_eq!(ctx.log_len(), 1);
        assert_eq!(fork.id(), ctx.id());
    }

    #[test]
    fn snapshots_are_copies() {
        let ctx = Context::new();
        ctx.set("k", json!("before"));
        ctx.append_record("wf", "a", &json!(null));
        ctx.set("k", json!("after"));

        let log = ctx.log();
        assert_eq!(log[0].memory.get("k"), Some(&json!("before")));
    }

    #[test]
    fn writes_bubble_through_apply() {
        let parent = Context::new();
        parent.set("gone", json!(true));
        parent.take_writes();

        let fork = parent.fork();
        fork.set("x", json!(1));
        fork.remove("gone");

        parent.apply_writes(fork.take_writes());
        assert_eq!(parent.get("x"), Some(json!(1)));
        assert_eq!(parent.get("gone"), None);

        let writes = parent.take_writes();
        assert_eq!(writes.get("x"), Some(&Some(json!(1))));
        assert_eq!(writes.get("gone"), Some(&None));
        assert!(fork.take_writes().is_empty());
    }

    #[test]
    fn fingerprint_is_stable_and_distinguishes_values() {
        let a = fingerprint(&json!({"b": 1, "a": 2}));
        let b = fingerprint(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_ne!(a, fingerprint(&json!({"a": 3})));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn cancellation_reaches_forks() {
        let ctx = Context::new();
        let fork = ctx.fork();
        ctx.cancel();
        assert!(fork.is_cancelled());
    }

    #[test]
    fn push_metadata_builds_array() {
        let ctx = Context::new();
        ctx.push_metadata("errors", json!("one"));
        ctx.push_metadata("errors", json!("two"));
        assert_eq!(ctx.metadata("errors"), Some(json!(["one", "two"])));
    }
}
