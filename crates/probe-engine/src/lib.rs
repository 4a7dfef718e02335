//! Scenario graph ordering, dispatch, comparison, and the task pipeline that
//! braids them together with provisioning and container lifecycle.

pub mod comparator;
pub mod executor;
pub mod graph;
pub mod pipeline;

pub use executor::{ExecutorError, ScenarioExecutor};
pub use graph::GraphError;
pub use pipeline::{PipelineError, TaskPipeline};
