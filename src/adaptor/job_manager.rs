//! Resource manager command lines, job scripts and output parsing.

use super::{AdaptorError, AdaptorResult, CommandOutput};
use crate::models::JobManagerType;
use std::collections::HashMap;

/// Everything needed to render a batch script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobDescriptor {
    pub job_name: String,
    pub working_directory: String,
    pub executable_path: String,
    pub input_arguments: Vec<String>,
    pub standard_out_file: String,
    pub standard_error_file: String,
    pub node_count: u32,
    pub cpu_count: u32,
    pub queue_name: Option<String>,
    pub max_wall_time_minutes: u32,
    pub allocation_project: Option<String>,
    pub module_load_commands: Vec<String>,
    pub pre_job_commands: Vec<String>,
    pub post_job_commands: Vec<String>,
}

/// What a status command said about one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQueryOutcome {
    /// Provider state code as printed by the resource manager
    Known(String),
    /// The resource manager reports the job id as unknown
    UnknownJob,
    /// The resource manager rejects the id as malformed
    IllegalJobId,
    /// The job was not mentioned at all
    Missing,
}

fn wall_time(minutes: u32) -> String {
    let minutes = minutes.max(1);
    format!("{:02}:{:02}:00", minutes / 60, minutes % 60)
}

fn numeric_part(job_id: &str) -> &str {
    job_id.split('.').next().unwrap_or(job_id)
}

impl JobManagerType {
    pub fn script_file_name(&self) -> &'static str {
        match self {
            Self::Pbs => "job.pbs",
            Self::Slurm => "job.slurm",
            Self::Fork => "job.sh",
        }
    }

    pub fn submit_command(&self, working_dir: &str, script_path: &str) -> String {
        match self {
            Self::Pbs => format!("cd {working_dir} && qsub {script_path}"),
            Self::Slurm => format!("cd {working_dir} && sbatch {script_path}"),
            Self::Fork => {
                format!("cd {working_dir} && nohup /bin/sh {script_path} > /dev/null 2>&1 & echo $!")
            }
        }
    }

    pub fn cancel_command(&self, job_id: &str) -> String {
        match self {
            Self::Pbs => format!("qdel {job_id}"),
            Self::Slurm => format!("scancel {job_id}"),
            Self::Fork => format!("kill -TERM {job_id}"),
        }
    }

    pub fn status_command(&self, job_ids: &[String]) -> String {
        match self {
            Self::Pbs => format!("qstat {}", job_ids.join(" ")),
            Self::Slurm => format!("sacct -n -X -P -o JobID,State -j {}", job_ids.join(",")),
            Self::Fork => format!("ps -o pid= -p {}", job_ids.join(",")),
        }
    }

    /// Extract the job id from the output of the submit command
    pub fn parse_submit_output(&self, output: &CommandOutput) -> AdaptorResult<String> {
        if !output.is_success() {
            return Err(AdaptorError::CommandFailed {
                command: format!("{self} submit"),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let unparsable = || AdaptorError::UnparsableOutput {
            what: "job id",
            output: output.stdout.trim().to_string(),
        };

        match self {
            Self::Pbs => output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| {
                    !line.is_empty()
                        && numeric_part(line).trim_end_matches("[]").chars().all(|c| c.is_ascii_digit())
                })
                .map(str::to_string)
                .ok_or_else(unparsable),
            Self::Slurm => output
                .stdout
                .lines()
                .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
                .ok_or_else(unparsable),
            Self::Fork => output
                .stdout
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .filter(|line| line.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
                .ok_or_else(unparsable),
        }
    }

    /// Provider state for each requested job
    pub fn parse_status_output(
        &self,
        job_ids: &[String],
        output: &CommandOutput,
    ) -> HashMap<String, StatusQueryOutcome> {
        let codes = match self {
            Self::Pbs => parse_qstat(&output.stdout),
            Self::Slurm => parse_sacct(&output.stdout),
            Self::Fork => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|pid| (pid.to_string(), "R".to_string()))
                .collect(),
        };
        let combined = output.combined();

        job_ids
            .iter()
            .map(|job_id| {
                let code = codes
                    .get(job_id)
                    .or_else(|| codes.get(numeric_part(job_id)))
                    .cloned();
                let outcome = match (code, self) {
                    (Some(code), _) => StatusQueryOutcome::Known(code),
                    (None, Self::Fork) => StatusQueryOutcome::Known("DONE".to_string()),
                    (None, _) if mentions(&combined, "illegally formed job identifier", job_id) => {
                        StatusQueryOutcome::IllegalJobId
                    }
                    (None, _)
                        if mentions(&combined, "Unknown Job Id", job_id)
                            || combined.contains("Invalid job id specified") =>
                    {
                        StatusQueryOutcome::UnknownJob
                    }
                    (None, _) => StatusQueryOutcome::Missing,
                };
                (job_id.clone(), outcome)
            })
            .collect()
    }

    /// Render the batch script for this resource manager
    pub fn generate_script(&self, job: &JobDescriptor) -> String {
        let mut lines = Vec::new();
        let nodes = job.node_count.max(1);
        let cpus = job.cpu_count.max(nodes);

        match self {
            Self::Pbs => {
                lines.push("#!/bin/bash".to_string());
                lines.push(format!("#PBS -N {}", job.job_name));
                if let Some(queue) = &job.queue_name {
                    lines.push(format!("#PBS -q {queue}"));
                }
                if let Some(account) = &job.allocation_project {
                    lines.push(format!("#PBS -A {account}"));
                }
                lines.push(format!("#PBS -l nodes={}:ppn={}", nodes, (cpus / nodes).max(1)));
                lines.push(format!("#PBS -l walltime={}", wall_time(job.max_wall_time_minutes)));
                lines.push(format!("#PBS -o {}", job.standard_out_file));
                lines.push(format!("#PBS -e {}", job.standard_error_file));
            }
            Self::Slurm => {
                lines.push("#!/bin/bash".to_string());
                lines.push(format!("#SBATCH -J {}", job.job_name));
                if let Some(queue) = &job.queue_name {
                    lines.push(format!("#SBATCH -p {queue}"));
                }
                if let Some(account) = &job.allocation_project {
                    lines.push(format!("#SBATCH -A {account}"));
                }
                lines.push(format!("#SBATCH -N {nodes}"));
                lines.push(format!("#SBATCH -n {cpus}"));
                lines.push(format!("#SBATCH -t {}", wall_time(job.max_wall_time_minutes)));
                lines.push(format!("#SBATCH -o {}", job.standard_out_file));
                lines.push(format!("#SBATCH -e {}", job.standard_error_file));
            }
            Self::Fork => {
                lines.push("#!/bin/sh".to_string());
            }
        }

        lines.push(format!("cd {}", job.working_directory));
        lines.extend(job.module_load_commands.iter().cloned());
        lines.extend(job.pre_job_commands.iter().cloned());

        let mut command = job.executable_path.clone();
        for argument in &job.input_arguments {
            command.push(' ');
            command.push_str(argument);
        }
        if *self == Self::Fork {
            command = format!(
                "{command} > {} 2> {}",
                job.standard_out_file, job.standard_error_file
            );
        }
        lines.push(command);
        lines.extend(job.post_job_commands.iter().cloned());

        lines.join("\n") + "\n"
    }
}

fn mentions(output: &str, phrase: &str, job_id: &str) -> bool {
    output
        .lines()
        .any(|line| line.contains(phrase) && line.contains(job_id))
}

/// Default `qstat` layout: `Job id  Name  User  Time Use  S  Queue`
fn parse_qstat(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Job") && !line.starts_with('-'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let id = parts[0].trim_end_matches('*');
            Some((numeric_part(id).to_string(), parts[4].to_string()))
        })
        .collect()
}

/// `sacct -P` layout: `JobID|State`
fn parse_sacct(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (id, state) = line.trim().split_once('|')?;
            let state = state.split_whitespace().next()?;
            Some((id.trim().to_string(), state.to_string()))
        })
        .collect()
}
