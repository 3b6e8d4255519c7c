//! # Compute Adaptors
//!
//! Command and file access on compute resources, plus the resource manager
//! specific command lines and output parsing used by job submission,
//! cancellation and the pull monitor.

pub mod errors;
pub mod job_manager;
pub mod local;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

pub use errors::{AdaptorError, AdaptorResult};
pub use job_manager::{JobDescriptor, StatusQueryOutcome};
pub use local::LocalComputeAdaptor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr together, for matching resource manager messages
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Remote command and file access on one compute resource
#[async_trait]
pub trait ComputeAdaptor: Send + Sync + 'static {
    /// Run a shell command; a non-zero exit is reported in the output, not as an error
    async fn execute_command(&self, command: &str, working_dir: Option<&str>) -> AdaptorResult<CommandOutput>;

    /// Create a directory and its parents; succeeds if it already exists
    async fn create_directory(&self, path: &str) -> AdaptorResult<()>;

    async fn copy_file(&self, source: &str, destination: &str) -> AdaptorResult<()>;

    async fn write_file(&self, path: &str, contents: &str) -> AdaptorResult<()>;

    async fn file_exists(&self, path: &str) -> AdaptorResult<bool>;

    async fn list_directory(&self, path: &str) -> AdaptorResult<Vec<String>>;
}

/// Hands out the adaptor for a compute resource
#[async_trait]
pub trait AdaptorResolver: Send + Sync + 'static {
    async fn resolve(&self, compute_resource_id: &str) -> AdaptorResult<Arc<dyn ComputeAdaptor>>;
}

/// Resolver with a default adaptor and per-resource overrides
pub struct StaticAdaptorResolver {
    default: Option<Arc<dyn ComputeAdaptor>>,
    overrides: DashMap<String, Arc<dyn ComputeAdaptor>>,
}

impl StaticAdaptorResolver {
    pub fn new(default: Option<Arc<dyn ComputeAdaptor>>) -> Self {
        Self {
            default,
            overrides: DashMap::new(),
        }
    }

    /// Every resource runs through `adaptor`
    pub fn single(adaptor: Arc<dyn ComputeAdaptor>) -> Self {
        Self::new(Some(adaptor))
    }

    pub fn register(&self, compute_resource_id: impl Into<String>, adaptor: Arc<dyn ComputeAdaptor>) {
        self.overrides.insert(compute_resource_id.into(), adaptor);
    }
}

#[async_trait]
impl AdaptorResolver for StaticAdaptorResolver {
    async fn resolve(&self, compute_resource_id: &str) -> AdaptorResult<Arc<dyn ComputeAdaptor>> {
        if let Some(adaptor) = self.overrides.get(compute_resource_id) {
            return Ok(Arc::clone(adaptor.value()));
        }
        self.default
            .clone()
            .ok_or_else(|| AdaptorError::UnknownResource(compute_resource_id.to_string()))
    }
}
