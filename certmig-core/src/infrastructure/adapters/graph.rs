// certmig-core/src/infrastructure/adapters/graph.rs

use async_trait::async_trait;
use neo4rs::{query, BoltBoolean, BoltFloat, BoltInteger, BoltMap, BoltString, BoltType, Graph};

use crate::error::MigrationError;
use crate::infrastructure::config::GraphEndpoint;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::store::{GraphEdge, GraphNode, GraphStore};

/// The property under which a node's source-store internal id is
/// exported, and later matched for edge reconstruction on the target.
pub const INTERNAL_ID_PROP: &str = "_internal_id";
const LABELS_PROP: &str = "_labels";

/// Graph adapter over Bolt. Node identity across environments is the
/// `id` property; the source-internal node id only travels along as
/// `_internal_id` so edges can be rebuilt after loading.
pub struct Neo4jStore {
    graph: Graph,
    store_id: String,
}

impl Neo4jStore {
    pub async fn connect(
        store_id: &str,
        endpoint: &GraphEndpoint,
    ) -> Result<Self, MigrationError> {
        let graph = Graph::new(&endpoint.uri, &endpoint.user, &endpoint.password)
            .await
            .map_err(|e| {
                MigrationError::Infrastructure(InfrastructureError::Connection {
                    store: store_id.to_string(),
                    reason: e.to_string(),
                })
            })?;
        Ok(Self {
            graph,
            store_id: store_id.to_string(),
        })
    }
}

/// Labels joined for a Cypher pattern, sanitized to identifier chars so
/// a stored label can never smuggle query syntax.
fn label_fragment(labels: &[String]) -> String {
    let safe: Vec<String> = labels
        .iter()
        .map(|l| sanitize_identifier(l))
        .filter(|l| !l.is_empty())
        .collect();
    if safe.is_empty() {
        "Node".to_string()
    } else {
        safe.join(":")
    }
}

fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// JSON scalar -> Bolt parameter. Containers travel as their JSON text;
/// the staging format already stores them that way.
fn json_to_bolt(value: &serde_json::Value) -> BoltType {
    match value {
        serde_json::Value::Null => BoltType::Null(Default::default()),
        serde_json::Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0))),
        },
        serde_json::Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        other => BoltType::String(BoltString::from(other.to_string().as_str())),
    }
}

fn props_to_bolt(properties: &serde_json::Map<String, serde_json::Value>) -> BoltMap {
    let mut map = BoltMap::default();
    for (key, value) in properties {
        map.put(BoltString::from(key.as_str()), json_to_bolt(value));
    }
    map
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn extract_neighborhood(
        &self,
        root_label: &str,
        root_key: &str,
        max_depth: u32,
    ) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), MigrationError> {
        let label = sanitize_identifier(root_label);

        // Depth 0 includes the root itself
        let nodes_cypher = format!(
            "MATCH path = (d:{} {{id: $root_key}})-[*0..{}]-(connected)
             RETURN DISTINCT connected AS node",
            label, max_depth
        );

        let mut nodes = Vec::new();
        let mut stream = self
            .graph
            .execute(query(&nodes_cypher).param("root_key", root_key))
            .await?;
        while let Some(row) = stream.next().await? {
            let node: neo4rs::Node = row
                .get("node")
                .map_err(|e| MigrationError::InternalError(format!("node decode: {}", e)))?;

            let mut properties = serde_json::Map::new();
            for key in node.keys() {
                let value: serde_json::Value = node.get(key).map_err(|e| {
                    MigrationError::InternalError(format!("property '{}' decode: {}", key, e))
                })?;
                properties.insert(key.to_string(), value);
            }

            nodes.push(GraphNode {
                internal_id: node.id(),
                labels: node.labels().iter().map(|l| l.to_string()).collect(),
                properties,
            });
        }

        let edges_cypher = format!(
            "MATCH path = (d:{} {{id: $root_key}})-[*0..{}]-(connected)
             UNWIND relationships(path) AS rel
             RETURN DISTINCT
                 id(startNode(rel)) AS start_id,
                 type(rel) AS rel_type,
                 id(endNode(rel)) AS end_id,
                 properties(rel) AS props",
            label, max_depth
        );

        let mut edges = Vec::new();
        let mut stream = self
            .graph
            .execute(query(&edges_cypher).param("root_key", root_key))
            .await?;
        while let Some(row) = stream.next().await? {
            let props: serde_json::Value = row
                .get("props")
                .unwrap_or(serde_json::Value::Object(Default::default()));
            let properties = match props {
                serde_json::Value::Object(map) => map,
                _ => Default::default(),
            };
            edges.push(GraphEdge {
                start_internal_id: row
                    .get("start_id")
                    .map_err(|e| MigrationError::InternalError(format!("edge decode: {}", e)))?,
                edge_type: row
                    .get("rel_type")
                    .map_err(|e| MigrationError::InternalError(format!("edge decode: {}", e)))?,
                end_internal_id: row
                    .get("end_id")
                    .map_err(|e| MigrationError::InternalError(format!("edge decode: {}", e)))?,
                properties,
            });
        }

        tracing::info!(
            store = %self.store_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "neighborhood extracted"
        );
        Ok((nodes, edges))
    }

    async fn load_nodes(&self, nodes: &[GraphNode]) -> Result<usize, MigrationError> {
        let mut loaded = 0usize;

        for node in nodes {
            let labels = label_fragment(&node.labels);

            // Merge on the stable id property; SET n = $props replaces
            // properties outright so stale values never survive.
            let mut props = node.properties.clone();
            props.insert(
                INTERNAL_ID_PROP.to_string(),
                serde_json::Value::from(node.internal_id),
            );
            props.insert(
                LABELS_PROP.to_string(),
                serde_json::Value::String(node.labels.join(":")),
            );

            let id_param = props
                .get("id")
                .cloned()
                .unwrap_or_else(|| serde_json::Value::from(node.internal_id));

            let cypher = format!("MERGE (n:{} {{id: $id}}) SET n = $props", labels);
            self.graph
                .run(
                    query(&cypher)
                        .param("id", json_to_bolt(&id_param))
                        .param("props", BoltType::Map(props_to_bolt(&props))),
                )
                .await?;
            loaded += 1;
        }

        Ok(loaded)
    }

    async fn load_edges(&self, edges: &[GraphEdge]) -> Result<usize, MigrationError> {
        let mut loaded = 0usize;

        for edge in edges {
            let edge_type = sanitize_identifier(&edge.edge_type);
            if edge_type.is_empty() {
                continue;
            }

            let cypher = format!(
                "MATCH (a {{{id}: $start}}), (b {{{id}: $end}})
                 MERGE (a)-[r:{t}]->(b)
                 SET r = $props",
                id = INTERNAL_ID_PROP,
                t = edge_type
            );
            self.graph
                .run(
                    query(&cypher)
                        .param("start", edge.start_internal_id)
                        .param("end", edge.end_internal_id)
                        .param("props", BoltType::Map(props_to_bolt(&edge.properties))),
                )
                .await?;
            loaded += 1;
        }

        Ok(loaded)
    }

    async fn delete_by_tenant(
        &self,
        root_label: &str,
        root_key: &str,
        max_depth: u32,
    ) -> Result<usize, MigrationError> {
        let label = sanitize_identifier(root_label);

        let count_cypher = format!(
            "MATCH (d:{} {{id: $root_key}})
             OPTIONAL MATCH (d)-[*1..{}]-(connected)
             RETURN count(DISTINCT d) + count(DISTINCT connected) AS total",
            label, max_depth
        );
        let mut stream = self
            .graph
            .execute(query(&count_cypher).param("root_key", root_key))
            .await?;
        let total: i64 = match stream.next().await? {
            Some(row) => row.get("total").unwrap_or(0),
            None => 0,
        };

        let delete_cypher = format!(
            "MATCH (d:{} {{id: $root_key}})
             OPTIONAL MATCH (d)-[*1..{}]-(connected)
             DETACH DELETE d, connected",
            label, max_depth
        );
        self.graph
            .run(query(&delete_cypher).param("root_key", root_key))
            .await?;

        Ok(total as usize)
    }

    fn store_id(&self) -> &str {
        &self.store_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_label_fragment_sanitizes() {
        assert_eq!(
            label_fragment(&["District".into(), "Tenant".into()]),
            "District:Tenant"
        );
        assert_eq!(label_fragment(&["Evil) DETACH DELETE".into()]), "EvilDETACHDELETE");
        assert_eq!(label_fragment(&[]), "Node");
    }

    #[test]
    fn test_json_to_bolt_scalars() {
        assert!(matches!(
            json_to_bolt(&serde_json::json!(42)),
            BoltType::Integer(_)
        ));
        assert!(matches!(
            json_to_bolt(&serde_json::json!(2.5)),
            BoltType::Float(_)
        ));
        assert!(matches!(
            json_to_bolt(&serde_json::json!("x")),
            BoltType::String(_)
        ));
        assert!(matches!(
            json_to_bolt(&serde_json::json!(null)),
            BoltType::Null(_)
        ));
        // Containers degrade to their JSON text
        assert!(matches!(
            json_to_bolt(&serde_json::json!([1, 2])),
            BoltType::String(_)
        ));
    }
}
