//! # Task Graph Executor
//!
//! Process workflows as dependency graphs of idempotent tasks. The
//! [`manager`] turns launch and terminate events into workflows, the
//! [`executor`] runs them, and [`tasks`] holds one implementation per
//! [`TaskType`].

pub mod context;
pub mod definition;
pub mod errors;
pub mod executor;
pub mod manager;
pub mod task;
pub mod tasks;
pub mod types;

pub use context::{RunningWorkflows, TaskContext, TaskServices};
pub use definition::{WorkflowDefinition, WorkflowNode};
pub use errors::{WorkflowError, WorkflowResult};
pub use executor::WorkflowExecutor;
pub use manager::WorkflowManager;
pub use task::{ProcessTask, TaskFactory};
pub use types::{TaskOutcome, TaskResult, TaskType, WorkflowOutcome};
