#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod engine;
mod error;
pub mod flow;
pub mod record;
pub mod step;

#[doc(hidden)]
pub mod prelude;

pub use engine::{Failure, FailurePolicy, Lineage, RunConfig, RunResult, Runner, Table, run};
pub use error::{FlowError, FlowResult};
pub use flow::{Flow, FlowStructure, chain, parallel, passthrough};
pub use record::Record;
pub use step::{Arguments, IntoProducts, Products, Signature, Step, step, step_fn, step_stream};

/// Tracing target for flow operations.
pub const TRACING_TARGET: &str = "artflow_flow";

/// Name of the lineage entry holding the original input record.
pub const INPUT_STEP: &str = "input";
