//! # Workflow Manager
//!
//! Consumes process launch and terminate events from the process launch
//! exchange and drives the matching workflows through the executor. Each
//! delivery is handled on its own tokio task, bounded by
//! `max_concurrent_workflows`, so a terminate can overtake the pre workflow
//! it cancels. Deliveries are acked once handled; transient failures are
//! requeued.

use super::definition::WorkflowDefinition;
use super::errors::{WorkflowError, WorkflowResult};
use super::executor::WorkflowExecutor;
use super::types::WorkflowOutcome;
use crate::constants::{messaging as keys, reasons};
use crate::messaging::{
    Delivery, MessageBus, MessageEvent, ProcessIdentifier, ProcessSubmitEvent, ProcessTerminateEvent,
};
use crate::models::ProcessModel;
use crate::monitor::{MonitorError, MonitorResult, PostWorkflowLauncher};
use crate::registry::StatusWrite;
use crate::state_machine::ProcessState;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct WorkflowManager {
    executor: Arc<WorkflowExecutor>,
    bus: Arc<dyn MessageBus>,
    queue: String,
    workflow_slots: Arc<Semaphore>,
}

impl std::fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("queue", &self.queue)
            .field("available_workflow_slots", &self.workflow_slots.available_permits())
            .finish()
    }
}

impl WorkflowManager {
    pub fn new(executor: Arc<WorkflowExecutor>, bus: Arc<dyn MessageBus>) -> Self {
        let slots = executor.services().config.executor.max_concurrent_workflows.max(1);
        Self {
            executor,
            bus,
            queue: keys::PROCESS_LAUNCH_QUEUE.to_string(),
            workflow_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }

    /// Declare the launch queue and bind it to launch and terminate keys
    pub async fn declare(&self) -> WorkflowResult<()> {
        let exchange = &self.executor.services().config.messaging.process_launch_exchange;
        self.bus
            .declare_queue(
                &self.queue,
                exchange,
                &[
                    keys::PROCESS_LAUNCH_ROUTING_KEY.to_string(),
                    keys::PROCESS_TERMINATE_ROUTING_KEY.to_string(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn load_process(&self, process_id: &str) -> WorkflowResult<ProcessModel> {
        self.executor
            .services()
            .registry
            .get_process(process_id)
            .await?
            .ok_or_else(|| WorkflowError::ProcessNotFound(process_id.to_string()))
    }

    fn identity(process: &ProcessModel) -> ProcessIdentifier {
        ProcessIdentifier::new(&process.process_id, &process.experiment_id, &process.gateway_id)
    }

    /// Move the process to STARTED and run its pre workflow
    ///
    /// Returns `None` when the process is already terminal, being cancelled
    /// or past STARTED.
    #[instrument(skip(self, event), fields(process_id = %event.process_id))]
    pub async fn handle_submit(&self, event: &ProcessSubmitEvent) -> WorkflowResult<Option<WorkflowOutcome>> {
        let process = self.load_process(&event.process_id).await?;
        let services = self.executor.services();
        let current = services.process_state.current_state(&process.process_id).await?;
        if let Some(state) = current.filter(|state| state.is_terminal() || state.is_cancel_branch()) {
            info!(process_id = %process.process_id, state = %state, "🔄 PROCESS: Skipping launch");
            return Ok(None);
        }

        let write = services
            .process_state
            .transition(&Self::identity(&process), ProcessState::Started, None)
            .await?;
        if let StatusWrite::Rejected { reason } = write {
            // Already past STARTED: the pre workflow ran before this delivery.
            info!(process_id = %process.process_id, reason = %reason, "🔄 PROCESS: Skipping redelivered launch");
            return Ok(None);
        }
        let definition = WorkflowDefinition::pre_workflow(&process)?;
        let outcome = self.executor.execute(&process, definition).await?;
        Ok(Some(outcome))
    }

    /// Move the process to CANCELLING and run its cancel workflow
    #[instrument(skip(self, event), fields(process_id = %event.process_id))]
    pub async fn handle_terminate(&self, event: &ProcessTerminateEvent) -> WorkflowResult<Option<WorkflowOutcome>> {
        let process = self.load_process(&event.process_id).await?;
        let services = self.executor.services();
        let current = services.process_state.current_state(&process.process_id).await?;
        if let Some(state) = current.filter(|state| state.is_terminal()) {
            info!(process_id = %process.process_id, state = %state, "🔄 PROCESS: Nothing to cancel");
            return Ok(None);
        }

        services
            .process_state
            .transition(
                &Self::identity(&process),
                ProcessState::Cancelling,
                Some(reasons::PROCESS_CANCEL_REQUESTED),
            )
            .await?;
        let definition = WorkflowDefinition::cancel_workflow(&process)?;
        let outcome = self.executor.execute(&process, definition).await?;
        Ok(Some(outcome))
    }

    /// Run the post workflow of a process whose job finished
    #[instrument(skip(self))]
    /// Load the process and build its post workflow; `None` when it must not run
    async fn prepare_post(&self, process_id: &str) -> WorkflowResult<Option<(ProcessModel, WorkflowDefinition)>> {
        let process = self.load_process(process_id).await?;
        let current = self
            .executor
            .services()
            .process_state
            .current_state(process_id)
            .await?;
        if let Some(state) = current.filter(|state| state.is_terminal() || state.is_cancel_branch()) {
            info!(process_id, state = %state, "🔄 PROCESS: Skipping post workflow");
            return Ok(None);
        }
        let definition = WorkflowDefinition::post_workflow(&process)?;
        Ok(Some((process, definition)))
    }

    /// Handle one delivery and settle it on the bus
    pub async fn handle_delivery(&self, delivery: Delivery) -> WorkflowResult<()> {
        let message = match delivery.message() {
            Ok(message) => message,
            Err(e) => {
                warn!(delivery_tag = delivery.delivery_tag, error = %e, "Dropping malformed launch message");
                self.bus.ack(&delivery).await?;
                return Ok(());
            }
        };

        let result = match &message.event {
            MessageEvent::ProcessSubmit(event) => self.handle_submit(event).await,
            MessageEvent::ProcessTerminate(event) => self.handle_terminate(event).await,
            other => {
                warn!(message_type = ?other.message_type(), "Unexpected event on launch queue");
                Ok(None)
            }
        };

        match result {
            Ok(outcome) => {
                debug!(message_id = %message.message_id, outcome = ?outcome, "Launch message handled");
                self.bus.ack(&delivery).await?;
            }
            Err(e) if e.is_transient() => {
                warn!(message_id = %message.message_id, error = %e, "Launch message failed, requeueing");
                self.bus.nack(&delivery, true).await?;
            }
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "Launch message failed");
                self.bus.ack(&delivery).await?;
            }
        }
        Ok(())
    }

    /// Consume the launch queue until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> WorkflowResult<()> {
        self.declare().await?;
        info!(queue = %self.queue, "🔄 PROCESS: Workflow manager started");

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.workflow_slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.bus.receive(&self.queue, RECEIVE_TIMEOUT) => received,
            };
            match delivery {
                Ok(Some(delivery)) => {
                    let manager = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = manager.handle_delivery(delivery).await {
                            error!(error = %e, "Failed to settle launch message");
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Receive failed");
                    tokio::time::sleep(RECEIVE_TIMEOUT).await;
                }
            }
        }

        info!(queue = %self.queue, "🔄 PROCESS: Workflow manager stopped");
        Ok(())
    }
}

#[async_trait]
impl PostWorkflowLauncher for WorkflowManager {
    async fn launch_post_workflow(&self, process_id: &str, gateway_id: &str) -> MonitorResult<()> {
        let prepared = self
            .prepare_post(process_id)
            .await
            .map_err(|e| MonitorError::PostWorkflow {
                process_id: process_id.to_string(),
                message: e.to_string(),
                transient: e.is_transient(),
            })?;
        let Some((process, definition)) = prepared else {
            return Ok(());
        };

        // Only the run itself is detached from the status submitter.
        let manager = self.clone();
        let gateway_id = gateway_id.to_string();
        tokio::spawn(async move {
            let process_id = process.process_id.clone();
            match manager.executor.execute(&process, definition).await {
                Ok(outcome) => {
                    debug!(process_id, gateway_id, outcome = ?outcome, "Post workflow finished");
                }
                Err(e) => error!(process_id, gateway_id, error = %e, "Post workflow failed"),
            }
        });
        Ok(())
    }
}
