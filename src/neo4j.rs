use crate::config;
use crate::error::{ImportError, StoreError};
use crate::models::{Label, RelType, Value};
use crate::store::{is_plain_identifier, EdgePattern, EdgeRequest, GraphStore, PropertyMap};
use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph};
use std::collections::HashMap;
use tracing::{debug, info};

/// Cypher templates. `{label}`, `{start}`, `{end}` and `{rel}` are replaced with names
/// from the [`Label`] and [`RelType`] enums only.
const CYPHER_CREATE_NODES: &str = r#"UNWIND $batch AS row
CREATE (n:{label})
SET n = row
RETURN count(n) AS cnt"#;

/// Aggregating per row drops requests whose start or end id matches zero or several nodes.
const CYPHER_CREATE_EDGES: &str = r#"UNWIND $batch AS row
MATCH (a:{start} {id: row.start_id})
WITH row, collect(a) AS starts
MATCH (b:{end} {id: row.end_id})
WITH row, starts, collect(b) AS ends
WHERE size(starts) = 1 AND size(ends) = 1
WITH row, starts[0] AS a, ends[0] AS b
CREATE (a)-[r:{rel}]->(b)
SET r += row.props
RETURN count(r) AS cnt"#;

const CYPHER_DELETE_EDGES: &str = "MATCH ()-[r]->() DELETE r";

const CYPHER_DELETE_NODES: &str = "MATCH (n) DELETE n";

/// Neo4j over Bolt. Dropping the store closes its connection pool.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connects and checks the connection with a trivial query, retrying a few times
    /// while the server comes up.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, ImportError> {
        let max_retries = config::IMPORT_MAX_RETRIES;
        let delay = tokio::time::Duration::from_secs(config::IMPORT_RETRY_DELAY_SECS);

        let mut last_error = String::new();
        for attempt in 1..=max_retries {
            match Graph::new(uri, user, password) {
                Ok(graph) => match graph.run(query("RETURN 1")).await {
                    Ok(_) => {
                        info!(uri, "Connected to Neo4j");
                        return Ok(Self { graph });
                    }
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }
            if attempt < max_retries {
                info!(attempt, uri, error = %last_error, "Cannot connect to Neo4j, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(ImportError::Connection {
            uri: uri.to_string(),
            reason: format!("{last_error} (after {max_retries} attempts)"),
        })
    }

    async fn run_cypher(&self, cypher: &str) -> Result<(), StoreError> {
        debug!(cypher, "Running");
        self.graph.run(query(cypher)).await?;
        Ok(())
    }

    async fn query_count(&self, q: neo4rs::Query) -> Result<u64, StoreError> {
        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| StoreError::UnexpectedResponse(format!("missing 'cnt': {e}")))?;
                u64::try_from(count)
                    .map_err(|_| StoreError::UnexpectedResponse(format!("negative count {count}")))
            }
            None => Ok(0),
        }
    }
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Str(s) => s.clone().into(),
        Value::Int(i) => (*i).into(),
        Value::Timestamp(_) | Value::Empty => value.to_string().into(),
    }
}

fn to_bolt_map(properties: &PropertyMap) -> HashMap<String, BoltType> {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), to_bolt(value)))
        .collect()
}

fn edge_row(request: &EdgeRequest) -> HashMap<String, BoltType> {
    let mut row: HashMap<String, BoltType> = HashMap::with_capacity(4);
    row.insert("seq".to_string(), (request.seq as i64).into());
    row.insert("start_id".to_string(), request.start_id.into());
    row.insert("end_id".to_string(), request.end_id.into());
    row.insert("props".to_string(), to_bolt_map(&request.properties).into());
    row
}

fn create_nodes_cypher(label: Label) -> String {
    CYPHER_CREATE_NODES.replace("{label}", label.as_str())
}

fn create_edges_cypher(pattern: EdgePattern) -> String {
    CYPHER_CREATE_EDGES
        .replace("{start}", pattern.start.as_str())
        .replace("{end}", pattern.end.as_str())
        .replace("{rel}", pattern.rel.as_str())
}

fn index_cypher(label: Label, property: &str) -> Result<String, StoreError> {
    if !is_plain_identifier(property) {
        return Err(StoreError::Rejected(format!(
            "'{property}' is not a valid property name"
        )));
    }
    let name = format!("{}_{property}", label.as_str().to_lowercase());
    Ok(format!(
        "CREATE INDEX {name} IF NOT EXISTS FOR (n:{label}) ON (n.{property})",
        label = label.as_str()
    ))
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn create_nodes(&self, label: Label, rows: &[PropertyMap]) -> Result<u64, StoreError> {
        let batch: Vec<HashMap<String, BoltType>> = rows.iter().map(to_bolt_map).collect();
        let q = query(&create_nodes_cypher(label)).param("batch", batch);
        self.query_count(q).await
    }

    async fn create_edges(
        &self,
        pattern: EdgePattern,
        requests: &[EdgeRequest],
    ) -> Result<u64, StoreError> {
        let batch: Vec<HashMap<String, BoltType>> = requests.iter().map(edge_row).collect();
        let q = query(&create_edges_cypher(pattern)).param("batch", batch);
        self.query_count(q).await
    }

    async fn count_nodes(&self, label: Label) -> Result<u64, StoreError> {
        let cypher = format!("MATCH (n:{}) RETURN count(n) AS cnt", label.as_str());
        self.query_count(query(&cypher)).await
    }

    async fn count_edges(&self, rel: RelType) -> Result<u64, StoreError> {
        let cypher = format!("MATCH ()-[r:{}]->() RETURN count(r) AS cnt", rel.as_str());
        self.query_count(query(&cypher)).await
    }

    async fn ensure_index(&self, label: Label, property: &str) -> Result<(), StoreError> {
        let cypher = index_cypher(label, property)?;
        self.run_cypher(&cypher).await
    }

    async fn delete_all_edges(&self) -> Result<(), StoreError> {
        self.run_cypher(CYPHER_DELETE_EDGES).await
    }

    async fn delete_all_nodes(&self) -> Result<(), StoreError> {
        self.run_cypher(CYPHER_DELETE_NODES).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_template_uses_label() {
        let cypher = create_nodes_cypher(Label::Forum);
        assert!(cypher.contains("CREATE (n:Forum)"));
        assert!(cypher.contains("UNWIND $batch AS row"));
        assert!(!cypher.contains("{label}"));
    }

    #[test]
    fn edge_template_replaces_every_placeholder() {
        let cypher = create_edges_cypher(EdgePattern {
            start: Label::Person,
            rel: RelType::StudyAt,
            end: Label::University,
        });
        assert!(cypher.contains("MATCH (a:Person {id: row.start_id})"));
        assert!(cypher.contains("MATCH (b:University {id: row.end_id})"));
        assert!(cypher.contains("CREATE (a)-[r:STUDY_AT]->(b)"));
        assert!(cypher.contains("size(starts) = 1 AND size(ends) = 1"));
        assert!(!cypher.contains("{start}"));
        assert!(!cypher.contains("{end}"));
        assert!(!cypher.contains("{rel}"));
    }

    #[test]
    fn index_statement() {
        let cypher = index_cypher(Label::Tag, "id").unwrap();
        assert_eq!(
            cypher,
            "CREATE INDEX tag_id IF NOT EXISTS FOR (n:Tag) ON (n.id)"
        );
    }

    #[test]
    fn index_rejects_injected_property() {
        assert!(index_cypher(Label::Tag, "id) DETACH DELETE n //").is_err());
    }

    #[test]
    fn empty_marker_written_as_empty_string() {
        assert_eq!(to_bolt(&Value::Empty), BoltType::from(""));
        assert_eq!(to_bolt(&Value::Int(5)), BoltType::from(5i64));
    }
}
