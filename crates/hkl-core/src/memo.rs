//! Reference tracking for dump (identity -> path) and load (path -> value).

use std::collections::HashMap;

use hkl_store::NodePath;
use hkl_types::Value;

/// Dump-side table of already written values.
///
/// Keys are handle addresses. Each entry holds a clone of the value so the
/// handle stays alive for the whole dump; otherwise a temporary created by
/// an encoder could be freed and its address reused by an unrelated value.
#[derive(Default)]
pub struct DumpMemo {
    seen: HashMap<usize, (NodePath, Value)>,
}

impl DumpMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical path of `value`, if it was written before.
    pub fn lookup(&self, value: &Value) -> Option<&NodePath> {
        value
            .identity()
            .and_then(|id| self.seen.get(&id))
            .map(|(path, _)| path)
    }

    /// Record `value` at `path`. Scalars are ignored.
    pub fn record(&mut self, value: &Value, path: &NodePath) {
        if let Some(id) = value.identity() {
            self.seen
                .entry(id)
                .or_insert_with(|| (path.clone(), value.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Materialization state of one stored node.
#[derive(Clone, Debug)]
pub enum NodeState {
    /// Decoder being resolved, or a leaf being decoded.
    Dispatching,
    /// Children being materialized; no handle published.
    Accumulating,
    /// Children being materialized behind a published placeholder.
    Placeholder(Value),
    Resolved(Value),
}

/// Load-side table of node states, keyed by path.
#[derive(Default)]
pub struct LoadMemo {
    states: HashMap<NodePath, NodeState>,
}

impl LoadMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &NodePath) -> Option<&NodeState> {
        self.states.get(path)
    }

    pub fn set(&mut self, path: &NodePath, state: NodeState) {
        self.states.insert(path.clone(), state);
    }

    /// The value reachable at `path`: resolved, or a published placeholder.
    pub fn value(&self, path: &NodePath) -> Option<Value> {
        match self.states.get(path)? {
            NodeState::Resolved(v) | NodeState::Placeholder(v) => Some(v.clone()),
            NodeState::Dispatching | NodeState::Accumulating => None,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
