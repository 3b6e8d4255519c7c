//! Adaptor that runs commands on the orchestrator host itself.

use super::{AdaptorError, AdaptorResult, CommandOutput, ComputeAdaptor};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalComputeAdaptor {
    command_timeout: Duration,
}

impl LocalComputeAdaptor {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for LocalComputeAdaptor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

fn file_error(operation: &'static str, path: &str, error: std::io::Error) -> AdaptorError {
    AdaptorError::FileOperation {
        operation,
        path: path.to_string(),
        message: error.to_string(),
    }
}

#[async_trait]
impl ComputeAdaptor for LocalComputeAdaptor {
    async fn execute_command(&self, command: &str, working_dir: Option<&str>) -> AdaptorResult<CommandOutput> {
        debug!(command, working_dir, "Executing local command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| AdaptorError::Timeout {
                command: command.to_string(),
                timeout_seconds: self.command_timeout.as_secs(),
            })?
            .map_err(|error| AdaptorError::Connection {
                host: "localhost".to_string(),
                message: error.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn create_directory(&self, path: &str) -> AdaptorResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| file_error("create_directory", path, e))
    }

    async fn copy_file(&self, source: &str, destination: &str) -> AdaptorResult<()> {
        if let Some(parent) = Path::new(destination).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| file_error("copy_file", destination, e))?;
        }
        tokio::fs::copy(source, destination)
            .await
            .map(|_| ())
            .map_err(|e| file_error("copy_file", source, e))
    }

    async fn write_file(&self, path: &str, contents: &str) -> AdaptorResult<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| file_error("write_file", path, e))
    }

    async fn file_exists(&self, path: &str) -> AdaptorResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| file_error("file_exists", path, e))
    }

    async fn list_directory(&self, path: &str) -> AdaptorResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| file_error("list_directory", path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| file_error("list_directory", path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
