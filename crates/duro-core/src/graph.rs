//! Dependency graph builder (spec §4.D).
//!
//! Recast from the original's attribute-bag graph library into an explicit
//! adjacency structure carrying only the two attributes the engine needs
//! per node (see Design Notes, "networkx-style graph").

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

/// Per-node data: the view's select query and its own declared interval.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub contents: String,
    pub interval_mins: Option<i64>,
}

/// Directed dependency graph: edge `parent -> child` means the parent's
/// select query references the child.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<String, NodeData>,
    /// `parent -> {child, ...}`
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, data: NodeData) {
        self.nodes.insert(name.into(), data);
    }

    pub fn node(&self, name: &str) -> Option<&NodeData> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &NodeData)> {
        self.nodes.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `name` (tables this one depends on), or `None` if `name`
    /// is not a node in the graph (spec §4.I step 4: `TableNotFoundInGraph`).
    pub fn children(&self, name: &str) -> Option<&BTreeSet<String>> {
        if !self.nodes.contains_key(name) {
            return None;
        }
        Some(self.edges.get(name).unwrap_or(&EMPTY_SET))
    }

    /// Build edges from textual references between every pair of nodes'
    /// select queries (spec §4.D). Must be called after all nodes are added.
    pub fn build_edges(&mut self) {
        self.edges.clear();
        let names: Vec<String> = self.nodes.keys().cloned().collect();

        for parent in &names {
            let stripped = strip_line_comments(&self.nodes[parent].contents);
            let mut children = BTreeSet::new();
            for child in &names {
                if child == parent {
                    continue;
                }
                if references_table(&stripped, child) {
                    children.insert(child.clone());
                }
            }
            if !children.is_empty() {
                self.edges.insert(parent.clone(), children);
            }
        }
    }

    /// Nodes with no incoming edges (spec GLOSSARY: "Root").
    pub fn roots(&self) -> Vec<String> {
        let mut has_incoming: BTreeSet<&str> = BTreeSet::new();
        for children in self.edges.values() {
            for child in children {
                has_incoming.insert(child.as_str());
            }
        }
        self.nodes
            .keys()
            .filter(|n| !has_incoming.contains(n.as_str()))
            .cloned()
            .collect()
    }

    /// Roots whose own interval is absent (spec §4.K: reject if any root
    /// lacks an interval).
    pub fn roots_without_interval(&self) -> Vec<String> {
        self.roots()
            .into_iter()
            .filter(|root| self.nodes[root].interval_mins.is_none())
            .collect()
    }

    /// Detect cycles via DFS; returns each simple cycle found as an ordered
    /// list of node names. Strict mode (spec §4.D: "No cycles are permitted
    /// in the strict-mode reschedule") aborts on any non-empty result.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = self
            .nodes
            .keys()
            .map(|n| (n.as_str(), Mark::Unvisited))
            .collect();
        let mut cycles = Vec::new();

        fn visit<'a>(
            node: &'a str,
            graph: &'a Graph,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            marks.insert(node, Mark::InProgress);
            stack.push(node);

            if let Some(children) = graph.edges.get(node) {
                for child in children {
                    match marks.get(child.as_str()).copied().unwrap_or(Mark::Unvisited) {
                        Mark::Unvisited => visit(child, graph, marks, stack, cycles),
                        Mark::InProgress => {
                            let start = stack.iter().position(|n| *n == child.as_str()).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|s| s.to_string()).collect();
                            cycle.sort();
                            cycles.push(cycle);
                        }
                        Mark::Done => {}
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
        }

        let names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        for name in names {
            if marks[name] == Mark::Unvisited {
                let mut stack = Vec::new();
                visit(name, self, &mut marks, &mut stack, &mut cycles);
            }
        }

        cycles
    }
}

static EMPTY_SET: BTreeSet<String> = BTreeSet::new();

/// Strip `--` line comments before scanning for references (spec §3).
fn strip_line_comments(query: &str) -> String {
    query
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Does `query` reference `table` as a word-bounded, optionally
/// double-quoted `schema.table` identifier?
///
/// This accepts false positives from string literals (spec §9, Open
/// Questions: the source accepts this and so do we — textual detection is
/// cheap and conservative-by-inclusion rather than precise).
fn references_table(query: &str, table: &str) -> bool {
    let Some((schema, name)) = super::table::split_qualified_name(table) else {
        return false;
    };
    let schema = regex::escape(schema);
    let name = regex::escape(name);
    let pattern = format!(
        r#"(?i)\b"?{schema}"?\s*\.\s*"?{name}"?\b"#
    );
    Regex::new(&pattern)
        .map(|re| re.is_match(query))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(contents: &str, interval: Option<i64>) -> NodeData {
        NodeData {
            contents: contents.to_string(),
            interval_mins: interval,
        }
    }

    #[test]
    fn builds_parent_to_child_edge() {
        let mut g = Graph::new();
        g.add_node("reporting.orders", node("select * from raw.orders", Some(60)));
        g.add_node("raw.orders", node("select * from source_orders", None));
        g.build_edges();

        let children = g.children("reporting.orders").unwrap();
        assert!(children.contains("raw.orders"));
    }

    #[test]
    fn ignores_references_inside_line_comments() {
        let mut g = Graph::new();
        g.add_node(
            "reporting.orders",
            node("-- uses raw.orders historically\nselect 1", Some(60)),
        );
        g.add_node("raw.orders", node("select 1", None));
        g.build_edges();

        assert!(g.children("reporting.orders").unwrap().is_empty());
    }

    #[test]
    fn matches_double_quoted_identifiers() {
        let mut g = Graph::new();
        g.add_node(
            "reporting.orders",
            node(r#"select * from "raw"."orders""#, Some(60)),
        );
        g.add_node("raw.orders", node("select 1", None));
        g.build_edges();

        assert!(g.children("reporting.orders").unwrap().contains("raw.orders"));
    }

    #[test]
    fn missing_node_yields_none_for_children() {
        let g = Graph::new();
        assert!(g.children("missing.table").is_none());
    }

    #[test]
    fn roots_without_interval_detected() {
        let mut g = Graph::new();
        g.add_node("reporting.orders", node("select * from raw.orders", None));
        g.add_node("raw.orders", node("select 1", Some(60)));
        g.build_edges();

        assert_eq!(g.roots_without_interval(), vec!["reporting.orders".to_string()]);
    }

    #[test]
    fn detects_simple_cycle() {
        let mut g = Graph::new();
        g.add_node("a.x", node("select * from b.y", Some(60)));
        g.add_node("b.y", node("select * from a.x", Some(60)));
        g.build_edges();

        assert_eq!(g.find_cycles().len(), 1);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let mut g = Graph::new();
        g.add_node("reporting.orders", node("select * from raw.orders", Some(60)));
        g.add_node("raw.orders", node("select 1", None));
        g.build_edges();

        assert!(g.find_cycles().is_empty());
    }
}
