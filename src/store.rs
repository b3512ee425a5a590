//! Store-agnostic write and count operations the import pipeline is built on.

use crate::error::StoreError;
use crate::models::{Label, RelType, Value};
use async_trait::async_trait;

/// Node properties, in source column order.
pub type PropertyMap = Vec<(String, Value)>;

/// One relationship to create between the nodes whose `id` equals the given values.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRequest {
    /// Position of the request within its batch; keeps identical rows distinct
    pub seq: usize,
    pub start_id: i64,
    pub end_id: i64,
    /// Relationship properties, never containing [`Value::Empty`]
    pub properties: PropertyMap,
}

/// `(start:Label)-[:TYPE]->(end:Label)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePattern {
    pub start: Label,
    pub rel: RelType,
    pub end: Label,
}

impl std::fmt::Display for EdgePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[:{}]->({})", self.start, self.rel, self.end)
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Creates one node per row in a single transaction. Returns nodes created.
    async fn create_nodes(&self, label: Label, rows: &[PropertyMap]) -> Result<u64, StoreError>;

    /// Creates one edge per request whose start and end node both resolve to exactly one
    /// node, in a single transaction. Requests that do not resolve are skipped. Returns
    /// edges created.
    async fn create_edges(
        &self,
        pattern: EdgePattern,
        requests: &[EdgeRequest],
    ) -> Result<u64, StoreError>;

    async fn count_nodes(&self, label: Label) -> Result<u64, StoreError>;

    async fn count_edges(&self, rel: RelType) -> Result<u64, StoreError>;

    /// Idempotent.
    async fn ensure_index(&self, label: Label, property: &str) -> Result<(), StoreError>;

    async fn delete_all_edges(&self) -> Result<(), StoreError>;

    async fn delete_all_nodes(&self) -> Result<(), StoreError>;
}

/// True for names that can be interpolated into a query as a bare identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_identifier("id"));
        assert!(is_plain_identifier("creation_date2"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("2id"));
        assert!(!is_plain_identifier("id}) DETACH DELETE n //"));
        assert!(!is_plain_identifier("Person.id"));
    }

    #[test]
    fn pattern_display() {
        let pattern = EdgePattern {
            start: Label::Person,
            rel: RelType::Knows,
            end: Label::Person,
        };
        assert_eq!(pattern.to_string(), "(Person)-[:KNOWS]->(Person)");
    }
}
