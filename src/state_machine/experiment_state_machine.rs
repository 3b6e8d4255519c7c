use super::errors::{StateMachineError, StateMachineResult};
use super::states::ExperimentState;
use crate::messaging::{EventPublisher, PendingEvents};
use crate::models::ExperimentStatus;
use crate::registry::{RegistryClient, StatusWrite};
use crate::resilience::BackoffConfig;
use std::sync::Arc;
use tracing::{debug, info};

/// Guarded experiment status writes followed by a status-change publish
///
/// Unpublished events are kept per experiment and go out with the next write.
#[derive(Clone)]
pub struct ExperimentStateMachine {
    registry: Arc<dyn RegistryClient>,
    publisher: EventPublisher,
    publish_attempts: u32,
    backoff: BackoffConfig,
    pending: Arc<PendingEvents>,
}

impl ExperimentStateMachine {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        publisher: EventPublisher,
        publish_attempts: u32,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            registry,
            publisher,
            publish_attempts,
            backoff,
            pending: Arc::new(PendingEvents::new()),
        }
    }

    pub async fn current_state(&self, experiment_id: &str) -> StateMachineResult<Option<ExperimentState>> {
        Ok(self
            .registry
            .get_experiment_status(experiment_id)
            .await?
            .map(|status| status.state))
    }

    pub async fn transition(
        &self,
        experiment_id: &str,
        gateway_id: &str,
        next: ExperimentState,
        reason: Option<&str>,
    ) -> StateMachineResult<StatusWrite> {
        let status = match reason {
            Some(reason) => ExperimentStatus::with_reason(next, reason),
            None => ExperimentStatus::new(next),
        };

        let write = self.registry.update_experiment_status(experiment_id, status).await?;
        if write.is_applied() {
            self.pending.record(
                experiment_id,
                EventPublisher::experiment_status_message(experiment_id, gateway_id, next),
            );
        }
        if self.pending.has_pending(experiment_id) {
            self.pending
                .flush(experiment_id, &self.publisher, self.publish_attempts, &self.backoff)
                .await
                .map_err(|source| StateMachineError::PublishFailed {
                    attempts: self.publish_attempts,
                    source,
                })?;
        }

        if write.is_applied() {
            info!(experiment_id, state = %next, reason, "🧪 EXPERIMENT: Status changed");
        } else {
            debug!(experiment_id, state = %next, ?write, "Experiment status unchanged");
        }
        Ok(write)
    }
}
