//! Flow composition.
//!
//! This module provides the composable execution plan:
//! - [`Flow`]: a step, chain, parallel or passthrough node
//! - [`chain`] and [`parallel`]: composition functions (also `>>` and `&`)
//! - [`FlowStructure`]: introspection of a flow without running it

mod diagram;
mod structure;

use std::collections::HashSet;
use std::ops::{BitAnd, Shr};
use std::sync::Arc;

pub use self::structure::FlowStructure;
use crate::INPUT_STEP;
use crate::error::{FlowError, FlowResult};
use crate::step::Step;

/// A composable, immutable execution plan.
///
/// Cloning a flow is cheap: steps are shared.
#[derive(Debug, Clone)]
pub enum Flow {
    /// A single step.
    Step(Arc<Step>),
    /// Nodes executed in sequence.
    Chain(Vec<Flow>),
    /// Nodes that each receive the same input.
    Parallel(Vec<Flow>),
    /// Forwards its input unchanged; only valid as a parallel branch.
    Passthrough,
}

impl Flow {
    /// Returns the number of distinct paths through this node.
    pub fn path_count(&self) -> usize {
        match self {
            Self::Step(_) | Self::Passthrough => 1,
            Self::Chain(nodes) => nodes.iter().map(Self::path_count).product(),
            Self::Parallel(branches) => branches.iter().map(Self::path_count).sum(),
        }
    }

    /// Enumerates every path through the flow as the sequence of step names.
    ///
    /// The position of a path in this list is the path index used by
    /// [`RunResult`](crate::RunResult).
    pub fn paths(&self) -> Vec<Vec<String>> {
        match self {
            Self::Step(step) => vec![vec![step.name().to_owned()]],
            Self::Passthrough => vec![Vec::new()],
            Self::Chain(nodes) => nodes.iter().fold(vec![Vec::new()], |prefixes, node| {
                let suffixes = node.paths();
                prefixes
                    .iter()
                    .flat_map(|prefix| {
                        suffixes.iter().map(move |suffix| {
                            let mut path = prefix.clone();
                            path.extend(suffix.iter().cloned());
                            path
                        })
                    })
                    .collect()
            }),
            Self::Parallel(branches) => branches.iter().flat_map(Self::paths).collect(),
        }
    }

    /// Returns every step in the flow, in declaration order.
    pub fn steps(&self) -> Vec<&Step> {
        let mut steps = Vec::new();
        self.collect_steps(&mut steps);
        steps
    }

    fn collect_steps<'a>(&'a self, steps: &mut Vec<&'a Step>) {
        match self {
            Self::Step(step) => steps.push(step),
            Self::Passthrough => {}
            Self::Chain(nodes) | Self::Parallel(nodes) => {
                nodes.iter().for_each(|node| node.collect_steps(steps));
            }
        }
    }

    /// Checks that the flow has a valid shape.
    ///
    /// Composites must not be empty, step names must be non-empty, must not
    /// shadow the input entry, and must be unique along every path, and a
    /// passthrough may only appear once as a direct parallel branch.
    pub fn validate(&self) -> FlowResult<()> {
        self.validate_node(false)?;

        for path in self.paths() {
            let mut seen = HashSet::with_capacity(path.len());
            if let Some(duplicate) = path.iter().find(|name| !seen.insert(name.as_str())) {
                return Err(FlowError::composition(format!(
                    "step name '{duplicate}' occurs more than once along path [{}]",
                    path.join(" > ")
                )));
            }
        }

        Ok(())
    }

    fn validate_node(&self, in_parallel: bool) -> FlowResult<()> {
        match self {
            Self::Step(step) => {
                if step.name().is_empty() {
                    return Err(FlowError::composition("step name must not be empty"));
                }
                if step.name() == INPUT_STEP {
                    return Err(FlowError::composition(format!(
                        "step name '{INPUT_STEP}' is reserved for the flow input"
                    )));
                }
                if step.name().contains('.') {
                    return Err(FlowError::composition(format!(
                        "step name '{}' must not contain '.', which separates table columns",
                        step.name()
                    )));
                }
                Ok(())
            }
            Self::Passthrough if in_parallel => Ok(()),
            Self::Passthrough => Err(FlowError::composition(
                "passthrough is only allowed as a branch of a parallel",
            )),
            Self::Chain(nodes) => {
                if nodes.is_empty() {
                    return Err(FlowError::composition("chain must have at least one node"));
                }
                nodes.iter().try_for_each(|node| node.validate_node(false))
            }
            Self::Parallel(branches) => {
                if branches.is_empty() {
                    return Err(FlowError::composition(
                        "parallel must have at least one branch",
                    ));
                }
                let passthroughs = branches
                    .iter()
                    .filter(|branch| matches!(branch, Self::Passthrough))
                    .count();
                if passthroughs > 1 {
                    return Err(FlowError::composition(
                        "parallel must have at most one passthrough branch",
                    ));
                }
                branches.iter().try_for_each(|branch| branch.validate_node(true))
            }
        }
    }

    /// Returns the structure of the flow for introspection.
    pub fn structure(&self) -> FlowStructure {
        FlowStructure::from(self)
    }

    /// Renders the flow as a Graphviz digraph.
    pub fn to_dot(&self) -> String {
        diagram::render_dot(self)
    }

    fn into_chain_nodes(self) -> Vec<Flow> {
        match self {
            Self::Chain(nodes) => nodes,
            other => vec![other],
        }
    }

    fn into_parallel_branches(self) -> Vec<Flow> {
        match self {
            Self::Parallel(branches) => branches,
            other => vec![other],
        }
    }
}

impl From<Step> for Flow {
    fn from(step: Step) -> Self {
        Self::Step(Arc::new(step))
    }
}

impl From<Arc<Step>> for Flow {
    fn from(step: Arc<Step>) -> Self {
        Self::Step(step)
    }
}

/// Composes nodes sequentially.
///
/// Nested chains are flattened and a single node is returned as is.
pub fn chain<I>(nodes: I) -> FlowResult<Flow>
where
    I: IntoIterator,
    I::Item: Into<Flow>,
{
    let mut flattened: Vec<Flow> = nodes
        .into_iter()
        .flat_map(|node| node.into().into_chain_nodes())
        .collect();

    let flow = match flattened.len() {
        0 => return Err(FlowError::composition("chain must have at least one node")),
        1 => flattened.remove(0),
        _ => Flow::Chain(flattened),
    };

    flow.validate_node(false)?;
    Ok(flow)
}

/// Composes nodes in parallel.
///
/// Nested parallels are flattened and a single node is returned as is.
pub fn parallel<I>(nodes: I) -> FlowResult<Flow>
where
    I: IntoIterator,
    I::Item: Into<Flow>,
{
    let flattened: Vec<Flow> = nodes
        .into_iter()
        .flat_map(|node| node.into().into_parallel_branches())
        .collect();

    if flattened.is_empty() {
        return Err(FlowError::composition(
            "parallel must have at least one branch",
        ));
    }

    let flow = Flow::Parallel(flattened);
    flow.validate_node(false)?;

    match flow {
        Flow::Parallel(mut branches) if branches.len() == 1 => Ok(branches.remove(0)),
        flow => Ok(flow),
    }
}

/// Creates a parallel branch that forwards its input unchanged.
pub fn passthrough() -> Flow {
    Flow::Passthrough
}

/// Composes nodes sequentially; see [`chain`].
#[macro_export]
macro_rules! chain {
    ($($node:expr),+ $(,)?) => {
        $crate::chain([$($crate::Flow::from($node)),+])
    };
}

/// Composes nodes in parallel; see [`parallel`].
#[macro_export]
macro_rules! parallel {
    ($($node:expr),+ $(,)?) => {
        $crate::parallel([$($crate::Flow::from($node)),+])
    };
}

impl<R: Into<Flow>> Shr<R> for Flow {
    type Output = Flow;

    fn shr(self, rhs: R) -> Flow {
        let mut nodes = self.into_chain_nodes();
        nodes.extend(rhs.into().into_chain_nodes());
        Flow::Chain(nodes)
    }
}

impl<R: Into<Flow>> Shr<R> for Step {
    type Output = Flow;

    fn shr(self, rhs: R) -> Flow {
        Flow::from(self) >> rhs
    }
}

impl<R: Into<Flow>> BitAnd<R> for Flow {
    type Output = Flow;

    fn bitand(self, rhs: R) -> Flow {
        let mut branches = self.into_parallel_branches();
        branches.extend(rhs.into().into_parallel_branches());
        Flow::Parallel(branches)
    }
}

impl<R: Into<Flow>> BitAnd<R> for Step {
    type Output = Flow;

    fn bitand(self, rhs: R) -> Flow {
        Flow::from(self) & rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Arguments, step_fn};

    fn noop(name: &str) -> Step {
        step_fn(name, |args: Arguments| Ok(args.into_record())).variadic()
    }

    #[test]
    fn chain_flattens_and_collapses() {
        let inner = chain([noop("a"), noop("b")]).unwrap();
        let outer = chain([inner, Flow::from(noop("c"))]).unwrap();
        assert!(matches!(&outer, Flow::Chain(nodes) if nodes.len() == 3));

        let single = chain([noop("a")]).unwrap();
        assert!(matches!(single, Flow::Step(_)));
    }

    #[test]
    fn empty_composites_are_rejected() {
        let error = chain(Vec::<Flow>::new()).unwrap_err();
        assert!(matches!(error, FlowError::Composition(_)));

        let error = parallel(Vec::<Flow>::new()).unwrap_err();
        assert!(matches!(error, FlowError::Composition(_)));

        assert!(Flow::Chain(Vec::new()).validate().is_err());
    }

    #[test]
    fn operators_match_functions() {
        let by_operator = noop("a") >> (noop("b") & noop("c") & passthrough());
        let by_function =
            chain!(noop("a"), parallel!(noop("b"), noop("c"), passthrough()).unwrap()).unwrap();

        assert_eq!(by_operator.structure(), by_function.structure());
        by_operator.validate().unwrap();
    }

    #[test]
    fn paths_follow_declaration_order() {
        let flow =
            noop("a") >> (noop("b") & (noop("c") >> noop("d")) & passthrough()) >> noop("e");

        assert_eq!(flow.path_count(), 3);
        assert_eq!(
            flow.paths(),
            vec![
                vec!["a", "b", "e"],
                vec!["a", "c", "d", "e"],
                vec!["a", "e"],
            ]
        );
    }

    #[test]
    fn duplicate_names_along_a_path_are_rejected() {
        let flow = noop("a") >> noop("b") >> noop("a");
        let error = flow.validate().unwrap_err();
        assert!(error.to_string().contains("'a'"));

        // The same name on different branches is fine.
        let flow = noop("a") >> (noop("b") & noop("b2")) >> noop("c");
        flow.validate().unwrap();
        let flow = parallel!(noop("x") >> noop("b"), noop("y") >> noop("b")).unwrap();
        flow.validate().unwrap();
    }

    #[test]
    fn reserved_and_misplaced_nodes_are_rejected() {
        assert!(Flow::from(noop(INPUT_STEP)).validate().is_err());
        assert!(Flow::from(noop("")).validate().is_err());
        let error = (noop("a") >> noop("b.c")).validate().unwrap_err();
        assert!(error.to_string().contains("'b.c'"));
        assert!(chain!(noop("a"), passthrough()).is_err());
        assert!(parallel!(noop("a"), passthrough(), passthrough()).is_err());
    }

    #[test]
    fn steps_are_listed_in_declaration_order() {
        let flow = noop("a") >> (noop("b") & noop("c"));
        let names: Vec<_> = flow.steps().iter().map(|s| s.name().to_owned()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
