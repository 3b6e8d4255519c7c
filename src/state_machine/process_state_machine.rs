use super::errors::{StateMachineError, StateMachineResult};
use super::states::ProcessState;
use crate::messaging::{EventPublisher, PendingEvents, ProcessIdentifier};
use crate::models::ProcessStatus;
use crate::registry::{RegistryClient, StatusWrite};
use crate::resilience::BackoffConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Guarded process status writes followed by a status-change publish
///
/// The registry applies the monotonic guard. Only an applied write is
/// published, so stale writers never emit events. A failed publish is retried;
/// if it still fails the registry keeps the new status, the event stays
/// pending and the error is returned to the caller. The next write for the
/// process, including the duplicate a retry produces, publishes it.
#[derive(Clone)]
pub struct ProcessStateMachine {
    registry: Arc<dyn RegistryClient>,
    publisher: EventPublisher,
    publish_attempts: u32,
    backoff: BackoffConfig,
    pending: Arc<PendingEvents>,
}

impl ProcessStateMachine {
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

    pub fn has_pending_events(&self, process_id: &str) -> bool {
        self.pending.has_pending(process_id)
    }

    pub async fn current_state(&self, process_id: &str) -> StateMachineResult<Option<ProcessState>> {
        Ok(self
            .registry
            .get_process_status(process_id)
            .await?
            .map(|status| status.state))
    }

    #[instrument(skip(self, reason), fields(process_id = %identity.process_id, state = %next))]
    pub async fn transition(
        &self,
        identity: &ProcessIdentifier,
        next: ProcessState,
        reason: Option<&str>,
    ) -> StateMachineResult<StatusWrite> {
        let status = match reason {
            Some(reason) => ProcessStatus::with_reason(next, reason),
            None => ProcessStatus::new(next),
        };

        let write = self
            .registry
            .add_process_status(&identity.process_id, status)
            .await?;

        if write.is_applied() {
            self.pending.record(
                &identity.process_id,
                EventPublisher::process_status_message(identity, next),
            );
        }
        if self.pending.has_pending(&identity.process_id) {
            self.pending
                .flush(&identity.process_id, &self.publisher, self.publish_attempts, &self.backoff)
                .await
                .map_err(|source| StateMachineError::PublishFailed {
                    attempts: self.publish_attempts,
                    source,
                })?;
        }

        match &write {
            StatusWrite::Applied => {
                info!(
                    process_id = %identity.process_id,
                    experiment_id = %identity.experiment_id,
                    state = %next,
                    "🔄 PROCESS: Status changed"
                );
            }
            StatusWrite::Duplicate => {
                debug!(process_id = %identity.process_id, state = %next, "Process already in state");
            }
            StatusWrite::Rejected { reason } => {
                warn!(process_id = %identity.process_id, state = %next, reason = %reason, "Process transition rejected");
            }
        }

        Ok(write)
    }

    /// Like `transition`, but a rejected write is reported as an error
    pub async fn transition_strict(
        &self,
        identity: &ProcessIdentifier,
        next: ProcessState,
        reason: Option<&str>,
    ) -> StateMachineResult<()> {
        match self.transition(identity, next, reason).await? {
            StatusWrite::Applied | StatusWrite::Duplicate => Ok(()),
            StatusWrite::Rejected { reason } => Err(StateMachineError::GuardFailed { reason }),
        }
    }
}
