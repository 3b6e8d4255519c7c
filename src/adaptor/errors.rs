use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdaptorError {
    #[error("Connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("Command timed out after {timeout_seconds}s: {command}")]
    Timeout { command: String, timeout_seconds: u64 },

    #[error("Command '{command}' exited with {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("File operation {operation} failed on {path}: {message}")]
    FileOperation {
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("Could not parse {what} from resource manager output: {output}")]
    UnparsableOutput { what: &'static str, output: String },

    #[error("No adaptor available for compute resource {0}")]
    UnknownResource(String),
}

impl AdaptorError {
    /// Network trouble may clear up; a failing command will fail again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

pub type AdaptorResult<T> = Result<T, AdaptorError>;
