#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Airavata Core
//!
//! Experiment orchestration for science gateways: launching experiments
//! onto compute resources, executing each process as a graph of tasks and
//! tracking the remote batch jobs those tasks submit.
//!
//! ## Architecture
//!
//! A gateway calls the [`orchestrator`] to launch an experiment. The
//! orchestrator validates it, creates its processes and publishes one launch
//! message per process. The [`workflow`] manager consumes those messages and
//! runs the pre-submission task graph, which ends with a batch job submitted
//! through a compute [`adaptor`]. The pull and push [`monitor`]s observe the
//! job; once it finishes, the post-processing graph stages outputs and
//! completes the process. Every status write goes through the monotonic
//! guards in [`state_machine`] before it is published on the bus.
//!
//! ## Module Organization
//!
//! - [`orchestrator`] - Launch, validation and termination API
//! - [`workflow`] - Task graph definitions, executor and workflow manager
//! - [`monitor`] - Pull and push job status monitors and the status pipeline
//! - [`state_machine`] - Experiment, process, task and job states and their guards
//! - [`registry`] - Registry client trait and in-memory implementation
//! - [`messaging`] - Message bus trait, envelopes and publishers
//! - [`adaptor`] - Compute resource command execution and job manager dialects
//! - [`config`] - Configuration management
//! - [`system_context`] - Composition root
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use airavata_core::orchestrator::OrchestratorApi;
//! use airavata_core::system_context::SystemContext;
//!
//! # async fn run() -> airavata_core::error::Result<()> {
//! let context = SystemContext::new().await?;
//! context.start()?;
//! context.orchestrator.launch_experiment("EXP_1", "default").await?;
//! context.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adaptor;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod resilience;
pub mod state_machine;
pub mod system_context;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod workflow;

pub use config::{ConfigManager, OrchestratorConfig};
pub use error::{OrchestratorError, Result};
pub use orchestrator::{OrchestratorApi, OrchestratorService};
pub use system_context::SystemContext;
