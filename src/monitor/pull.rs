//! Polling monitor that runs status commands on the compute resources.

use super::pipeline::StatusPipeline;
use super::result::JobStatusResult;
use super::status_mapping::map_state;
use super::tracker::{JobTracker, TrackedJob};
use crate::adaptor::{AdaptorResolver, StatusQueryOutcome};
use crate::config::MonitorConfig;
use crate::models::JobManagerType;
use crate::state_machine::JobState;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one polling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub polled: usize,
    pub emitted: usize,
    pub dropped: usize,
    pub failures: usize,
}

impl PollSummary {
    fn merge(&mut self, other: PollSummary) {
        self.polled += other.polled;
        self.emitted += other.emitted;
        self.dropped += other.dropped;
        self.failures += other.failures;
    }
}

pub struct PullMonitor {
    tracker: Arc<JobTracker>,
    adaptors: Arc<dyn AdaptorResolver>,
    pipeline: StatusPipeline,
    config: MonitorConfig,
    host_limits: DashMap<String, Arc<Semaphore>>,
}

impl PullMonitor {
    pub const PUBLISHER_NAME: &'static str = "pull_monitor";

    pub fn new(
        tracker: Arc<JobTracker>,
        adaptors: Arc<dyn AdaptorResolver>,
        pipeline: StatusPipeline,
        config: MonitorConfig,
    ) -> Self {
        Self {
            tracker,
            adaptors,
            pipeline,
            config,
            host_limits: DashMap::new(),
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    fn host_limit(&self, host: &str) -> Arc<Semaphore> {
        self.host_limits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrent_polls_per_host.max(1))))
            .clone()
    }

    /// Poll every tracked job once
    pub async fn poll_once(&self) -> PollSummary {
        for job_id in self.tracker.drain_cancelled() {
            info!(job_id = %job_id, "Stopped monitoring job of cancelled process");
        }

        let chunk_size = self.config.jobs_per_status_command.max(1);
        let mut rounds = Vec::new();
        for ((host, manager), jobs) in self.tracker.by_host() {
            let limit = self.host_limit(&host);
            for chunk in jobs.chunks(chunk_size) {
                rounds.push(self.poll_chunk(host.clone(), manager, chunk.to_vec(), limit.clone()));
            }
        }

        let mut summary = PollSummary::default();
        for chunk_summary in join_all(rounds).await {
            summary.merge(chunk_summary);
        }
        if summary.polled > 0 {
            debug!(?summary, "Pull monitor round finished");
        }
        summary
    }

    async fn poll_chunk(
        &self,
        host: String,
        manager: JobManagerType,
        jobs: Vec<TrackedJob>,
        limit: Arc<Semaphore>,
    ) -> PollSummary {
        let mut summary = PollSummary {
            polled: jobs.len(),
            ..PollSummary::default()
        };
        let Ok(_permit) = limit.acquire_owned().await else {
            return summary;
        };

        let adaptor = match self.adaptors.resolve(&host).await {
            Ok(adaptor) => adaptor,
            Err(e) => {
                error!(compute_resource_id = %host, error = %e, "No adaptor for compute resource");
                summary.failures += jobs.len();
                return summary;
            }
        };

        let ids: Vec<String> = jobs.iter().map(|job| job.job_id.clone()).collect();
        let command = manager.status_command(&ids);
        let output = match adaptor.execute_command(&command, None).await {
            Ok(output) => output,
            Err(e) => {
                error!(compute_resource_id = %host, command = %command, error = %e, "Status command failed");
                summary.failures += jobs.len();
                return summary;
            }
        };
        let outcomes = manager.parse_status_output(&ids, &output);

        for job in jobs {
            let outcome = outcomes
                .get(&job.job_id)
                .cloned()
                .unwrap_or(StatusQueryOutcome::Missing);
            match outcome {
                StatusQueryOutcome::Known(code) => {
                    let state = map_state(manager, &code);
                    if self.tracker.observe(&job.job_id, state)
                        && self.emit(&job, state, None, &mut summary).await
                    {
                        self.tracker.commit_state(&job.job_id, state);
                    }
                }
                StatusQueryOutcome::IllegalJobId => {
                    warn!(job_id = %job.job_id, "Job id rejected by resource manager, no longer monitoring");
                    self.tracker.untrack(&job.job_id);
                    summary.dropped += 1;
                }
                StatusQueryOutcome::UnknownJob | StatusQueryOutcome::Missing => {
                    let failures = self.tracker.record_failure(&job.job_id);
                    summary.failures += 1;
                    if failures >= self.config.max_consecutive_failures {
                        warn!(job_id = %job.job_id, failures, "Job unknown to resource manager");
                        let queued = self
                            .emit(
                                &job,
                                JobState::Unknown,
                                Some(crate::constants::reasons::JOB_UNREACHABLE),
                                &mut summary,
                            )
                            .await;
                        if queued {
                            self.tracker.untrack(&job.job_id);
                        }
                    }
                }
            }
        }
        summary
    }

    /// Hand one report to the pipeline; true once it is queued
    async fn emit(&self, job: &TrackedJob, state: JobState, reason: Option<&str>, summary: &mut PollSummary) -> bool {
        let mut result =
            JobStatusResult::new(&job.job_id, &job.job_name, state).published_by(Self::PUBLISHER_NAME);
        if let Some(reason) = reason {
            result = result.with_reason(reason);
        }
        match self.pipeline.submit(result).await {
            Ok(true) => {
                summary.emitted += 1;
                true
            }
            Ok(false) => {
                error!(job_id = %job.job_id, state = %state, "Status for job not in registry dropped");
                self.tracker.untrack(&job.job_id);
                summary.dropped += 1;
                false
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "Failed to queue job status, retrying next poll");
                summary.failures += 1;
                false
            }
        }
    }

    /// Poll on the configured interval until `token` is cancelled
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "🛰️ MONITOR: Pull monitor started"
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
        info!("🛰️ MONITOR: Pull monitor stopped");
    }
}
