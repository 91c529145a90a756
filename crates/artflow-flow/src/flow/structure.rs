//! Introspection of a flow's shape.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Flow;
use crate::step::Signature;

/// The shape of a flow, without its functions.
///
/// Serializes as a tagged tree and renders as an indented outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowStructure {
    /// A single step.
    Step {
        /// Step name.
        name: String,
        /// Declared parameters.
        signature: Signature,
        /// Names of the bound arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        bound: Vec<String>,
    },
    /// Nodes executed in sequence.
    Chain {
        /// Child nodes, in order.
        nodes: Vec<FlowStructure>,
    },
    /// Nodes that each receive the same input.
    Parallel {
        /// Branches, in order.
        branches: Vec<FlowStructure>,
    },
    /// Forwards its input unchanged.
    Passthrough,
}

impl From<&Flow> for FlowStructure {
    fn from(flow: &Flow) -> Self {
        match flow {
            Flow::Step(step) => Self::Step {
                name: step.name().to_owned(),
                signature: step.signature().clone(),
                bound: step.bound().fields().map(str::to_owned).collect(),
            },
            Flow::Chain(nodes) => Self::Chain {
                nodes: nodes.iter().map(Self::from).collect(),
            },
            Flow::Parallel(branches) => Self::Parallel {
                branches: branches.iter().map(Self::from).collect(),
            },
            Flow::Passthrough => Self::Passthrough,
        }
    }
}

impl FlowStructure {
    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Self::Step {
                name, signature, ..
            } => {
                write!(f, "{indent}{name}")?;
                if signature.variadic {
                    write!(f, "(..)")?;
                } else if !signature.required.is_empty() || !signature.optional.is_empty() {
                    let params: Vec<_> = signature
                        .required
                        .iter()
                        .cloned()
                        .chain(signature.optional.iter().map(|field| format!("{field}?")))
                        .collect();
                    write!(f, "({})", params.join(", "))?;
                }
                writeln!(f)
            }
            Self::Chain { nodes } => {
                writeln!(f, "{indent}chain")?;
                nodes.iter().try_for_each(|node| node.write_tree(f, depth + 1))
            }
            Self::Parallel { branches } => {
                writeln!(f, "{indent}parallel")?;
                branches
                    .iter()
                    .try_for_each(|branch| branch.write_tree(f, depth + 1))
            }
            Self::Passthrough => writeln!(f, "{indent}passthrough"),
        }
    }
}

impl fmt::Display for FlowStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::flow::passthrough;
    use crate::step::{Arguments, step_fn};

    #[test]
    fn renders_outline() {
        let a = step_fn("a", |args: Arguments| Ok(args.into_record())).require(["x"]);
        let b = step_fn("b", |args: Arguments| Ok(args.into_record())).optional(["y"]);
        let flow = a >> (b & passthrough());

        assert_eq!(
            flow.structure().to_string(),
            "chain\n  a(x)\n  parallel\n    b(y?)\n    passthrough\n"
        );
    }

    #[test]
    fn serializes_as_tagged_tree() {
        let flow = step_fn("a", |args: Arguments| Ok(args.into_record()))
            .variadic()
            .bind("k", 1)
            & passthrough();

        let value = serde_json::to_value(flow.structure()).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "parallel",
                "branches": [
                    {
                        "kind": "step",
                        "name": "a",
                        "signature": { "required": [], "optional": [], "variadic": true },
                        "bound": ["k"],
                    },
                    { "kind": "passthrough" },
                ],
            })
        );
    }
}
