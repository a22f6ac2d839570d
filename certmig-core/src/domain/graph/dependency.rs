// certmig-core/src/domain/graph/dependency.rs

use crate::domain::catalog::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Suggested edge to ignore when linearizing a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPoint {
    pub break_from: String,
    pub break_to: String,
    pub strategy: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// Node sequence `v0 .. vk = v0`, rotated so the lexically smallest
    /// node comes first.
    pub tables: Vec<String>,
    pub break_point: BreakPoint,
}

/// Output of the schema analysis phase. Serialized as
/// `schema-analysis.json` and consumed by the extractor, the loader and
/// the validator (explicit FK metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAnalysis {
    /// parent -> children, every FK contributes exactly one edge.
    pub dependency_graph: BTreeMap<String, Vec<String>>,
    pub extraction_order: Vec<String>,
    pub extraction_by_store: BTreeMap<String, Vec<String>>,
    pub circular_dependencies: Vec<CycleReport>,
    pub has_cycles: bool,
    pub total_tables: usize,
    pub total_relationships: usize,
    /// Catalog metadata carried for downstream phases.
    pub tables: Vec<TableSchema>,
}

impl SchemaAnalysis {
    pub fn table(&self, qualified_name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.qualified_name == qualified_name)
    }

    /// Extraction order restricted to one store, bare `schema.table` names.
    pub fn order_for_store(&self, store: &str) -> Vec<String> {
        self.extraction_by_store
            .get(store)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct GraphSolver;

impl GraphSolver {
    /// Builds the global dependency graph from catalog metadata, runs
    /// Kahn's algorithm for the extraction order and enumerates every
    /// simple cycle with a break-point suggestion. Output is fully
    /// deterministic for identical input: all maps are ordered and DFS
    /// explores children in sorted order.
    pub fn analyze(tables: &[TableSchema]) -> SchemaAnalysis {
        let graph = Self::build_graph(tables);
        let cycles = Self::find_cycles(&graph);

        let cycle_reports: Vec<CycleReport> = cycles
            .into_iter()
            .map(|cycle| {
                let break_point = Self::suggest_break_point(&cycle, &graph);
                CycleReport {
                    tables: cycle,
                    break_point,
                }
            })
            .collect();

        let break_edges: BTreeSet<(String, String)> = cycle_reports
            .iter()
            .map(|c| {
                (
                    c.break_point.break_from.clone(),
                    c.break_point.break_to.clone(),
                )
            })
            .collect();

        let (extraction_order, has_cycles) = Self::topological_sort(&graph, &break_edges);

        let mut extraction_by_store: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for qualified in &extraction_order {
            if let Some((store, rest)) = qualified.split_once('.') {
                extraction_by_store
                    .entry(store.to_string())
                    .or_default()
                    .push(rest.to_string());
            }
        }

        let total_relationships = graph.values().map(Vec::len).sum();

        SchemaAnalysis {
            total_tables: extraction_order.len(),
            total_relationships,
            dependency_graph: graph,
            extraction_order,
            extraction_by_store,
            circular_dependencies: cycle_reports,
            has_cycles,
            tables: tables.to_vec(),
        }
    }

    /// parent -> children. FK targets that are not in the catalog still
    /// become nodes, so a dangling reference is visible in the order.
    fn build_graph(tables: &[TableSchema]) -> BTreeMap<String, Vec<String>> {
        let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for table in tables {
            graph.entry(table.qualified_name.clone()).or_default();

            for fk in &table.foreign_keys {
                graph.entry(fk.to_table.clone()).or_default();
                graph
                    .entry(fk.to_table.clone())
                    .or_default()
                    .push(table.qualified_name.clone());
            }
        }

        for children in graph.values_mut() {
            children.sort();
        }

        graph
    }

    /// Kahn's algorithm. Edges listed in `break_edges` are ignored so
    /// each reported cycle contributes one representative pass through
    /// its nodes, starting at the break target.
    fn topological_sort(
        graph: &BTreeMap<String, Vec<String>>,
        break_edges: &BTreeSet<(String, String)>,
    ) -> (Vec<String>, bool) {
        let mut in_degree: BTreeMap<&str, usize> =
            graph.keys().map(|k| (k.as_str(), 0)).collect();

        for (parent, children) in graph {
            for child in children {
                if break_edges.contains(&(parent.clone(), child.clone())) {
                    continue;
                }
                *in_degree.entry(child.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(graph.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());

            if let Some(children) = graph.get(node) {
                for child in children {
                    if break_edges.contains(&(node.to_string(), child.clone())) {
                        continue;
                    }
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        let has_cycles = !break_edges.is_empty() || order.len() != graph.len();

        // Overlapping cycles may need more than one break; any residue
        // is appended in name order so the order always covers all nodes.
        if order.len() != graph.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let mut residue: Vec<String> = graph
                .keys()
                .filter(|k| !placed.contains(k.as_str()))
                .cloned()
                .collect();
            residue.sort();
            order.extend(residue);
        }

        (order, has_cycles)
    }

    /// DFS enumeration of simple cycles. Each cycle is reported exactly
    /// once, canonicalized by rotating its lexically smallest node first.
    fn find_cycles(graph: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut found: Vec<Vec<String>> = Vec::new();
        let mut seen_keys: BTreeSet<String> = BTreeSet::new();

        for node in graph.keys() {
            if !visited.contains(node.as_str()) {
                let mut rec_stack: BTreeSet<&str> = BTreeSet::new();
                Self::dfs(
                    node,
                    graph,
                    &mut visited,
                    &mut rec_stack,
                    Vec::new(),
                    &mut found,
                    &mut seen_keys,
                );
            }
        }

        found
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs<'a>(
        node: &'a str,
        graph: &'a BTreeMap<String, Vec<String>>,
        visited: &mut BTreeSet<&'a str>,
        rec_stack: &mut BTreeSet<&'a str>,
        mut path: Vec<&'a str>,
        found: &mut Vec<Vec<String>>,
        seen_keys: &mut BTreeSet<String>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(children) = graph.get(node) {
            for child in children {
                if !visited.contains(child.as_str()) {
                    Self::dfs(child, graph, visited, rec_stack, path.clone(), found, seen_keys);
                } else if rec_stack.contains(child.as_str()) {
                    if let Some(start) = path.iter().position(|n| *n == child.as_str()) {
                        let cycle = Self::canonicalize(&path[start..]);
                        let key = cycle.join("->");
                        if seen_keys.insert(key) {
                            found.push(cycle);
                        }
                    }
                }
            }
        }

        rec_stack.remove(node);
    }

    /// Rotates `nodes` so the smallest element comes first and closes
    /// the sequence by repeating it.
    fn canonicalize(nodes: &[&str]) -> Vec<String> {
        if nodes.is_empty() {
            return vec![];
        }
        let min_idx = nodes
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| *n)
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut cycle: Vec<String> = nodes[min_idx..]
            .iter()
            .chain(nodes[..min_idx].iter())
            .map(|s| s.to_string())
            .collect();
        cycle.push(cycle[0].clone());
        cycle
    }

    /// Break at the node with the fewest outgoing edges in the *full*
    /// graph; ties resolve to the lexically smallest node.
    fn suggest_break_point(
        cycle: &[String],
        graph: &BTreeMap<String, Vec<String>>,
    ) -> BreakPoint {
        let members = &cycle[..cycle.len().saturating_sub(1)];

        let break_from = members
            .iter()
            .min_by_key(|table| {
                (
                    graph.get(*table).map(Vec::len).unwrap_or(0),
                    (*table).clone(),
                )
            })
            .cloned()
            .unwrap_or_default();

        let from_idx = members.iter().position(|t| *t == break_from).unwrap_or(0);
        let break_to = members[(from_idx + 1) % members.len()].clone();
        let out_degree = graph.get(&break_from).map(Vec::len).unwrap_or(0);

        BreakPoint {
            strategy: format!(
                "Extract {} first without validating FK from {}",
                break_to, break_from
            ),
            impact: format!("Affects {} downstream tables", out_degree),
            break_from,
            break_to,
        }
    }
}

/// GraphViz rendering of the dependency graph (bare table names).
pub fn to_dot(graph: &BTreeMap<String, Vec<String>>) -> String {
    let mut out = String::from("digraph dependencies {\n  rankdir=LR;\n  node [shape=box];\n\n");
    for (parent, children) in graph {
        let parent_label = parent.rsplit('.').next().unwrap_or(parent);
        for child in children {
            let child_label = child.rsplit('.').next().unwrap_or(child);
            out.push_str(&format!("  \"{}\" -> \"{}\";\n", parent_label, child_label));
        }
    }
    out.push_str("}\n");
    out
}
