//! Scripted compute adaptor speaking the Slurm dialect.

use crate::adaptor::{AdaptorResult, CommandOutput, ComputeAdaptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Records every command and answers `sbatch`, `sacct` and `scancel` like a
/// small Slurm cluster. Files live in an in-memory set.
#[derive(Debug)]
pub struct MockComputeAdaptor {
    commands: Mutex<Vec<String>>,
    files: Mutex<BTreeSet<String>>,
    job_states: Mutex<HashMap<String, String>>,
    next_job_id: AtomicU64,
    fail_kills: AtomicBool,
}

impl Default for MockComputeAdaptor {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            files: Mutex::new(BTreeSet::new()),
            job_states: Mutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(1000),
            fail_kills: AtomicBool::new(false),
        }
    }
}

impl MockComputeAdaptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Number of batch submissions seen
    pub fn submissions(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.contains("sbatch "))
            .count()
    }

    /// Make `scancel` fail from now on
    pub fn fail_kills(&self, fail: bool) {
        self.fail_kills.store(fail, Ordering::SeqCst);
    }

    /// State code `sacct` reports for a job
    pub fn set_job_state(&self, job_id: &str, code: &str) {
        self.job_states.lock().insert(job_id.to_string(), code.to_string());
    }

    pub fn add_file(&self, path: &str) {
        self.files.lock().insert(path.to_string());
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.lock().contains(path)
    }

    fn sacct(&self, command: &str) -> CommandOutput {
        let ids = command.rsplit("-j ").next().unwrap_or_default();
        let states = self.job_states.lock();
        let lines: Vec<String> = ids
            .split(',')
            .map(str::trim)
            .filter_map(|id| states.get(id).map(|state| format!("{id}|{state}")))
            .collect();
        CommandOutput::success(lines.join("\n"))
    }

    fn scancel(&self, command: &str) -> CommandOutput {
        if self.fail_kills.load(Ordering::SeqCst) {
            return CommandOutput::failure("scancel: error: Kill job error on job id", 1);
        }
        if let Some(job_id) = command.split_whitespace().nth(1) {
            self.set_job_state(job_id, "CANCELLED");
        }
        CommandOutput::success("")
    }
}

#[async_trait]
impl ComputeAdaptor for MockComputeAdaptor {
    async fn execute_command(&self, command: &str, _working_dir: Option<&str>) -> AdaptorResult<CommandOutput> {
        self.commands.lock().push(command.to_string());
        let output = if command.contains("sbatch ") {
            let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst).to_string();
            self.set_job_state(&job_id, "PENDING");
            CommandOutput::success(format!("Submitted batch job {job_id}\n"))
        } else if command.starts_with("sacct ") {
            self.sacct(command)
        } else if command.starts_with("scancel ") {
            self.scancel(command)
        } else {
            CommandOutput::success("")
        };
        Ok(output)
    }

    async fn create_directory(&self, path: &str) -> AdaptorResult<()> {
        self.add_file(path);
        Ok(())
    }

    async fn copy_file(&self, _source: &str, destination: &str) -> AdaptorResult<()> {
        self.add_file(destination);
        Ok(())
    }

    async fn write_file(&self, path: &str, _contents: &str) -> AdaptorResult<()> {
        self.add_file(path);
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> AdaptorResult<bool> {
        Ok(self.has_file(path))
    }

    async fn list_directory(&self, path: &str) -> AdaptorResult<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .iter()
            .filter_map(|file| file.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}
