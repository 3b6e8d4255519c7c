//! Task implementations, one per [`TaskType`](super::TaskType).

mod cancellation;
mod completing;
mod data_staging;
mod env_setup;
mod job_submission;
mod job_verification;
mod parsing;

pub use cancellation::{CancelCompletingTask, RemoteJobCancellationTask, WorkflowCancellationTask};
pub use completing::CompletingTask;
pub use data_staging::{ArchiveTask, InputDataStagingTask, OutputDataStagingTask};
pub use env_setup::EnvSetupTask;
pub use job_submission::JobSubmissionTask;
pub use job_verification::JobVerificationTask;
pub use parsing::ParsingTriggeringTask;

use super::context::TaskContext;
use super::errors::WorkflowError;
use super::types::TaskResult;
use tracing::warn;

/// Convert an error into a task result; transient errors are retryable
pub(crate) fn task_failure(context: &TaskContext, error: WorkflowError) -> TaskResult {
    let retryable = error.is_transient();
    warn!(
        process_id = %context.process_id(),
        task_id = %context.task_id,
        task_type = %context.task_type,
        retryable,
        error = %error,
        "Task failed"
    );
    TaskResult::fail(error.to_string(), retryable)
}

/// Filesystem path of a `file://` URI or plain path
pub(crate) fn local_path(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

pub(crate) fn file_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

pub(crate) fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}
