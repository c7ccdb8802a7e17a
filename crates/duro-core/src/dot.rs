//! Minimal Graphviz `.dot` writer for the dependency graph (spec §4.D: the
//! graph is persisted alongside each reschedule for operator inspection).
//! No Graphviz crate is pulled in; the format is simple enough to emit by
//! hand.

use std::fmt::Write as _;

use crate::graph::Graph;

/// Render `graph` as a `digraph` with one `parent -> child;` edge per line,
/// quoting every node name since table names contain dots.
pub fn to_dot(graph: &Graph) -> String {
    let mut out = String::new();
    writeln!(out, "digraph duro {{").unwrap();

    for (name, _) in graph.nodes() {
        writeln!(out, "  \"{name}\";").unwrap();
    }

    for (name, _) in graph.nodes() {
        if let Some(children) = graph.children(name) {
            for child in children {
                writeln!(out, "  \"{name}\" -> \"{child}\";").unwrap();
            }
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeData;

    #[test]
    fn renders_nodes_and_edges() {
        let mut g = Graph::new();
        g.add_node(
            "reporting.orders",
            NodeData {
                contents: "select * from raw.orders".into(),
                interval_mins: Some(60),
            },
        );
        g.add_node(
            "raw.orders",
            NodeData {
                contents: "select 1".into(),
                interval_mins: None,
            },
        );
        g.build_edges();

        let dot = to_dot(&g);
        assert!(dot.starts_with("digraph duro {"));
        assert!(dot.contains("\"reporting.orders\";"));
        assert!(dot.contains("\"reporting.orders\" -> \"raw.orders\";"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
