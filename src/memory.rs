//! In-process graph used by `--dry-run` and the test suite.

use crate::error::StoreError;
use crate::models::{Label, RelType, Value, ID_PROPERTY};
use crate::store::{EdgePattern, EdgeRequest, GraphStore, PropertyMap};
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub label: Label,
    pub properties: PropertyMap,
}

impl MemoryNode {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryEdge {
    pub rel: RelType,
    pub start: usize,
    pub end: usize,
    pub properties: PropertyMap,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<MemoryNode>,
    edges: Vec<MemoryEdge>,
    /// (label, id) -> node positions; more than one entry means the id is ambiguous
    by_id: FxHashMap<(Label, i64), Vec<usize>>,
    indexes: FxHashSet<(Label, String)>,
}

impl Inner {
    fn unique(&self, label: Label, id: i64) -> Option<usize> {
        match self.by_id.get(&(label, id)).map(Vec::as_slice) {
            Some([node]) => Some(*node),
            _ => None,
        }
    }
}

/// Every batch is applied under one lock, so a batch is all-or-nothing.
#[derive(Default)]
pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    pub fn nodes(&self, label: Label) -> Vec<MemoryNode> {
        self.lock()
            .nodes
            .iter()
            .filter(|n| n.label == label)
            .cloned()
            .collect()
    }

    /// `(start id, end id, properties)` of every edge of type `rel`.
    pub fn edges(&self, rel: RelType) -> Vec<(Value, Value, PropertyMap)> {
        let inner = self.lock();
        let id_of = |node: usize| {
            inner.nodes[node]
                .property(ID_PROPERTY)
                .cloned()
                .unwrap_or(Value::Empty)
        };
        inner
            .edges
            .iter()
            .filter(|e| e.rel == rel)
            .map(|e| (id_of(e.start), id_of(e.end), e.properties.clone()))
            .collect()
    }

    pub fn has_index(&self, label: Label, property: &str) -> bool {
        self.lock().indexes.contains(&(label, property.to_string()))
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn create_nodes(&self, label: Label, rows: &[PropertyMap]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        for row in rows {
            let position = inner.nodes.len();
            let node = MemoryNode {
                label,
                properties: row.clone(),
            };
            // only integer ids are matchable; a string "7" never equals 7
            if let Some(Value::Int(id)) = node.property(ID_PROPERTY) {
                inner.by_id.entry((label, *id)).or_default().push(position);
            }
            inner.nodes.push(node);
        }
        Ok(rows.len() as u64)
    }

    async fn create_edges(
        &self,
        pattern: EdgePattern,
        requests: &[EdgeRequest],
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut created = 0u64;
        for request in requests {
            let start = inner.unique(pattern.start, request.start_id);
            let end = inner.unique(pattern.end, request.end_id);
            if let (Some(start), Some(end)) = (start, end) {
                inner.edges.push(MemoryEdge {
                    rel: pattern.rel,
                    start,
                    end,
                    properties: request.properties.clone(),
                });
                created += 1;
            }
        }
        Ok(created)
    }

    async fn count_nodes(&self, label: Label) -> Result<u64, StoreError> {
        let inner = self.lock();
        Ok(inner.nodes.iter().filter(|n| n.label == label).count() as u64)
    }

    async fn count_edges(&self, rel: RelType) -> Result<u64, StoreError> {
        let inner = self.lock();
        Ok(inner.edges.iter().filter(|e| e.rel == rel).count() as u64)
    }

    async fn ensure_index(&self, label: Label, property: &str) -> Result<(), StoreError> {
        self.lock().indexes.insert((label, property.to_string()));
        Ok(())
    }

    async fn delete_all_edges(&self) -> Result<(), StoreError> {
        self.lock().edges.clear();
        Ok(())
    }

    async fn delete_all_nodes(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.edges.is_empty() {
            return Err(StoreError::Rejected(format!(
                "cannot delete nodes, {} relationship(s) still attached",
                inner.edges.len()
            )));
        }
        inner.nodes.clear();
        inner.by_id.clear();
        Ok(())
    }
}
