//! # Data Models
//!
//! Registry-facing records for experiments, processes, tasks and jobs, plus
//! the resource descriptions the orchestrator reads while launching.

pub mod data;
pub mod experiment;
pub mod job;
pub mod process;
pub mod resource;
pub mod status;
pub mod task;

pub use data::{DataType, InputDataObject, OutputDataObject};
pub use experiment::{ExperimentModel, ExperimentType, UserConfigurationData};
pub use job::JobModel;
pub use process::{ComputationalResourceScheduling, ProcessModel, ProcessWorkflow, WorkflowKind};
pub use resource::{
    ApplicationDeployment, BatchQueue, ComputeResourceDescription, GroupComputeResourcePreference,
    GroupResourceProfile, JobManagerType,
};
pub use status::{
    ErrorModel, ExperimentStatus, JobStatus, ProcessStatus, StatusEntry, TaskStatus,
};
pub use task::{DataStageType, DataStagingTaskModel, TaskModel, TaskTypes};
