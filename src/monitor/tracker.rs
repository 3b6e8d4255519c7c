use crate::models::JobManagerType;
use crate::state_machine::JobState;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;

/// A submitted job the pull monitor keeps asking about
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub job_id: String,
    pub job_name: String,
    pub task_id: String,
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
    pub compute_resource_id: String,
    pub job_manager: JobManagerType,
    pub last_state: Option<JobState>,
    pub consecutive_failures: u32,
}

/// Jobs under monitoring, shared by job submission and the pull monitor
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<String, TrackedJob>,
    terminate: DashSet<String>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, job: TrackedJob) {
        self.terminate.remove(&job.job_id);
        self.jobs.insert(job.job_id.clone(), job);
    }

    pub fn untrack(&self, job_id: &str) -> Option<TrackedJob> {
        self.terminate.remove(job_id);
        self.jobs.remove(job_id).map(|(_, job)| job)
    }

    pub fn is_tracked(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<TrackedJob> {
        self.jobs.get(job_id).map(|job| job.value().clone())
    }

    /// Queue a job for removal because its process was cancelled
    pub fn mark_cancelled(&self, job_id: &str) {
        if self.jobs.contains_key(job_id) {
            self.terminate.insert(job_id.to_string());
        }
    }

    /// Drop every job on the terminate list, returning their ids
    pub fn drain_cancelled(&self) -> Vec<String> {
        let ids: Vec<String> = self.terminate.iter().map(|id| id.key().clone()).collect();
        for id in &ids {
            self.untrack(id);
        }
        ids
    }

    pub fn record_failure(&self, job_id: &str) -> u32 {
        self.jobs.get_mut(job_id).map_or(0, |mut job| {
            job.consecutive_failures += 1;
            job.consecutive_failures
        })
    }

    /// Whether `state` differs from the last state handed to the pipeline
    ///
    /// Resets the failure count. The state itself is stored by
    /// [`JobTracker::commit_state`] once the report has been queued.
    pub fn observe(&self, job_id: &str, state: JobState) -> bool {
        self.jobs.get_mut(job_id).is_some_and(|mut job| {
            job.consecutive_failures = 0;
            job.last_state != Some(state)
        })
    }

    pub fn commit_state(&self, job_id: &str, state: JobState) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.last_state = Some(state);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Tracked jobs grouped by compute resource and job manager
    pub fn by_host(&self) -> HashMap<(String, JobManagerType), Vec<TrackedJob>> {
        let mut grouped: HashMap<(String, JobManagerType), Vec<TrackedJob>> = HashMap::new();
        for entry in self.jobs.iter() {
            grouped
                .entry((entry.compute_resource_id.clone(), entry.job_manager))
                .or_default()
                .push(entry.value().clone());
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, host: &str) -> TrackedJob {
        TrackedJob {
            job_id: id.to_string(),
            job_name: format!("A{id}"),
            task_id: "t1".to_string(),
            process_id: "p1".to_string(),
            experiment_id: "e1".to_string(),
            gateway_id: "gw".to_string(),
            compute_resource_id: host.to_string(),
            job_manager: JobManagerType::Slurm,
            last_state: Some(JobState::Submitted),
            consecutive_failures: 0,
        }
    }

    #[test]
    fn test_observe_reports_changes_only() {
        let tracker = JobTracker::new();
        tracker.track(job("1", "h1"));
        assert!(!tracker.observe("1", JobState::Submitted));
        assert!(tracker.observe("1", JobState::Active));
        tracker.commit_state("1", JobState::Active);
        assert!(!tracker.observe("1", JobState::Active));
        assert!(!tracker.observe("missing", JobState::Active));
    }

    #[test]
    fn test_uncommitted_state_is_seen_again() {
        let tracker = JobTracker::new();
        tracker.track(job("1", "h1"));
        assert!(tracker.observe("1", JobState::Complete));
        assert!(tracker.observe("1", JobState::Complete));
        assert_eq!(tracker.get("1").and_then(|job| job.last_state), Some(JobState::Submitted));
    }

    #[test]
    fn test_failures_reset_on_observation() {
        let tracker = JobTracker::new();
        tracker.track(job("1", "h1"));
        assert_eq!(tracker.record_failure("1"), 1);
        assert_eq!(tracker.record_failure("1"), 2);
        tracker.observe("1", JobState::Queued);
        assert_eq!(tracker.record_failure("1"), 1);
    }

    #[test]
    fn test_cancelled_jobs_are_drained() {
        let tracker = JobTracker::new();
        tracker.track(job("1", "h1"));
        tracker.track(job("2", "h2"));
        tracker.mark_cancelled("1");
        tracker.mark_cancelled("unknown");
        assert_eq!(tracker.drain_cancelled(), vec!["1".to_string()]);
        assert!(!tracker.is_tracked("1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_grouping_by_host() {
        let tracker = JobTracker::new();
        tracker.track(job("1", "h1"));
        tracker.track(job("2", "h1"));
        tracker.track(job("3", "h2"));
        let grouped = tracker.by_host();
        assert_eq!(grouped[&("h1".to_string(), JobManagerType::Slurm)].len(), 2);
        assert_eq!(grouped[&("h2".to_string(), JobManagerType::Slurm)].len(), 1);
    }
}
