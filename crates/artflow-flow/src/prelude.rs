//! Convenient re-exports for common usage.

pub use crate::engine::{FailurePolicy, Lineage, RunConfig, RunResult, Runner, run};
pub use crate::error::{FlowError, FlowResult};
pub use crate::flow::{Flow, chain, parallel, passthrough};
pub use crate::record::Record;
pub use crate::step::{Arguments, IntoProducts, Products, Step, step, step_fn, step_stream};
