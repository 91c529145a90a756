//! Flow execution.
//!
//! This module provides the run driver and its results:
//! - [`Runner`] and [`run`]: execute a flow over input records
//! - [`RunConfig`]: concurrency, truncation and failure handling
//! - [`RunResult`] and [`Lineage`]: lineage-complete output

mod config;
mod executor;
mod lineage;
mod result;

pub use config::{
    DEFAULT_MAX_CONCURRENT_CALLS, DEFAULT_UNBOUNDED_LIMIT, FailurePolicy, RunConfig,
    RunConfigBuilder, RunConfigBuilderError,
};
pub use executor::{Runner, run};
pub use lineage::Lineage;
pub use result::{Failure, RunResult, Table};
