//! Graphviz rendering of a flow.

use std::fmt::Write as _;

use super::Flow;

const INPUT_NODE: &str = "input";
const OUTPUT_NODE: &str = "output";

struct DotWriter {
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
}

impl DotWriter {
    /// Adds the node and its incoming edges, returning the nodes whose
    /// records leave this part of the flow.
    fn visit(&mut self, flow: &Flow, preds: Vec<String>) -> Vec<String> {
        match flow {
            Flow::Step(step) => {
                let id = format!("step_{}", self.nodes.len());
                self.nodes
                    .push(format!("  {id} [label={:?}, shape=box];", step.name()));
                for pred in preds {
                    self.edges.push((pred, id.clone()));
                }
                vec![id]
            }
            Flow::Passthrough => preds,
            Flow::Chain(nodes) => nodes
                .iter()
                .fold(preds, |preds, node| self.visit(node, preds)),
            Flow::Parallel(branches) => {
                let mut exits = Vec::new();
                for branch in branches {
                    for exit in self.visit(branch, preds.clone()) {
                        if !exits.contains(&exit) {
                            exits.push(exit);
                        }
                    }
                }
                exits
            }
        }
    }
}

pub(super) fn render_dot(flow: &Flow) -> String {
    let mut writer = DotWriter {
        nodes: Vec::new(),
        edges: Vec::new(),
    };

    let exits = writer.visit(flow, vec![INPUT_NODE.to_owned()]);
    for exit in exits {
        writer.edges.push((exit, OUTPUT_NODE.to_owned()));
    }

    let mut dot = String::from("digraph flow {\n  rankdir=LR;\n");
    let _ = writeln!(dot, "  {INPUT_NODE} [shape=ellipse];");
    for node in &writer.nodes {
        let _ = writeln!(dot, "{node}");
    }
    let _ = writeln!(dot, "  {OUTPUT_NODE} [shape=ellipse];");
    for (from, to) in &writer.edges {
        let _ = writeln!(dot, "  {from} -> {to};");
    }
    dot.push_str("}\n");
    dot
}

#[cfg(test)]
mod tests {
    use crate::flow::passthrough;
    use crate::step::{Arguments, Step, step_fn};

    fn noop(name: &str) -> Step {
        step_fn(name, |args: Arguments| Ok(args.into_record())).variadic()
    }

    #[test]
    fn passthrough_links_around_branches() {
        let flow = noop("a") >> (noop("b") & passthrough()) >> noop("c");
        let dot = flow.to_dot();

        assert!(dot.starts_with("digraph flow {"));
        assert!(dot.contains("step_0 [label=\"a\", shape=box];"));
        assert!(dot.contains("input -> step_0;"));
        assert!(dot.contains("step_0 -> step_1;"));
        assert!(dot.contains("step_1 -> step_2;"));
        assert!(dot.contains("step_0 -> step_2;"));
        assert!(dot.contains("step_2 -> output;"));
    }

    #[test]
    fn parallel_exits_reach_output() {
        let dot = (noop("x") & noop("y")).to_dot();
        assert!(dot.contains("input -> step_0;"));
        assert!(dot.contains("input -> step_1;"));
        assert!(dot.contains("step_0 -> output;"));
        assert!(dot.contains("step_1 -> output;"));
    }
}
