//! # System Context
//!
//! Composition root. Builds the registry, bus, adaptors, workflow engine,
//! monitors and orchestrator once, injects the shared handles into each of
//! them and owns the background loops and their shutdown token.

use crate::adaptor::{AdaptorResolver, LocalComputeAdaptor, StaticAdaptorResolver};
use crate::config::{ConfigManager, OrchestratorConfig};
use crate::error::{OrchestratorError, Result};
use crate::messaging::{DbEventManager, EventPublisher, InMemoryMessageBus, InMemoryTopic, MessageBus, TopicConsumer};
use crate::monitor::{
    JobStatusValidator, JobTracker, ParserRegistry, PostWorkflowLauncher, PullMonitor, PushMonitor,
    StatusPipeline, StatusSubmitter, ValidatedJobStatus,
};
use crate::orchestrator::{BoundedWorkerPool, OrchestratorService};
use crate::registry::{InMemoryRegistry, RegistryClient};
use crate::state_machine::ProcessStateMachine;
use crate::workflow::{RunningWorkflows, TaskServices, WorkflowExecutor, WorkflowManager};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Collaborators supplied by the embedding application
pub struct Backends {
    pub registry: Arc<dyn RegistryClient>,
    pub bus: Arc<dyn MessageBus>,
    pub adaptors: Arc<dyn AdaptorResolver>,
    /// Source of pushed job status records
    pub job_status_topic: Arc<dyn TopicConsumer>,
}

impl Backends {
    /// In-memory registry, bus and topic with commands run on this host
    pub fn in_memory(config: &OrchestratorConfig) -> Self {
        Self {
            registry: Arc::new(InMemoryRegistry::new()),
            bus: Arc::new(InMemoryMessageBus::new(config.messaging.channel_capacity)),
            adaptors: Arc::new(StaticAdaptorResolver::single(Arc::new(LocalComputeAdaptor::default()))),
            job_status_topic: Arc::new(InMemoryTopic::new(config.messaging.job_status_topic.clone())),
        }
    }
}

/// Shared system dependencies and background loops
pub struct SystemContext {
    pub system_id: Uuid,
    pub config_manager: Arc<ConfigManager>,
    pub registry: Arc<dyn RegistryClient>,
    pub bus: Arc<dyn MessageBus>,
    pub services: Arc<TaskServices>,
    pub db_events: Arc<DbEventManager>,
    pub workflow_manager: WorkflowManager,
    pub orchestrator: OrchestratorService,
    pub pull_monitor: Arc<PullMonitor>,
    pub push_monitor: Option<Arc<PushMonitor>>,
    status_submitter: Arc<StatusSubmitter>,
    status_receiver: Mutex<Option<mpsc::Receiver<ValidatedJobStatus>>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system_id", &self.system_id)
            .field("gateway_id", &self.config_manager.config().gateway_id)
            .field("bus", &self.bus.provider_name())
            .field("push_monitor", &self.push_monitor.is_some())
            .field("running_loops", &self.handles.lock().len())
            .finish()
    }
}

impl SystemContext {
    /// Load configuration from the environment and wire in-memory backends
    pub async fn new() -> Result<Self> {
        info!("🔧 Initializing SystemContext with auto-detected environment configuration");
        let config_manager = ConfigManager::load()?;
        Self::from_config(config_manager).await
    }

    pub async fn from_config(config_manager: Arc<ConfigManager>) -> Result<Self> {
        let backends = Backends::in_memory(config_manager.config());
        Self::with_backends(config_manager, backends).await
    }

    /// Wire every component around the supplied backends
    ///
    /// Must run inside a tokio runtime; the launch pool spawns its workers here.
    pub async fn with_backends(config_manager: Arc<ConfigManager>, backends: Backends) -> Result<Self> {
        info!("🏗️ Creating system components with unified configuration");
        let config = Arc::new(config_manager.config().clone());
        let Backends {
            registry,
            bus,
            adaptors,
            job_status_topic,
        } = backends;
        let shutdown = CancellationToken::new();

        let status_publisher = EventPublisher::new(Arc::clone(&bus), config.messaging.status_exchange.clone());
        let process_state = ProcessStateMachine::new(
            Arc::clone(&registry),
            status_publisher.clone(),
            config.monitor.publish_retries,
            config.executor.backoff.clone(),
        );
        let job_tracker = Arc::new(JobTracker::new());

        let services = Arc::new(TaskServices {
            registry: Arc::clone(&registry),
            publisher: status_publisher.clone(),
            process_state: process_state.clone(),
            adaptors: Arc::clone(&adaptors),
            job_tracker: Arc::clone(&job_tracker),
            workflows: Arc::new(RunningWorkflows::new()),
            config: Arc::clone(&config),
        });
        let executor = Arc::new(WorkflowExecutor::new(Arc::clone(&services), shutdown.clone()));
        let workflow_manager = WorkflowManager::new(executor, Arc::clone(&bus));

        let (pipeline, status_receiver) = StatusPipeline::new(
            JobStatusValidator::new(Arc::clone(&registry)),
            config.monitor.status_queue_capacity,
        );
        let post_workflow: Arc<dyn PostWorkflowLauncher> = Arc::new(workflow_manager.clone());
        let status_submitter = Arc::new(StatusSubmitter::new(
            Arc::clone(&registry),
            status_publisher,
            process_state,
            post_workflow,
            Arc::clone(&job_tracker),
            config.monitor.publish_retries,
            config.executor.backoff.clone(),
        ));

        let pull_monitor = Arc::new(PullMonitor::new(
            job_tracker,
            adaptors,
            pipeline.clone(),
            config.monitor.clone(),
        ));
        let push_monitor = if config.monitor.push.enabled {
            Some(Arc::new(PushMonitor::new(
                job_status_topic,
                ParserRegistry::with_defaults()?,
                pipeline,
                config.monitor.push.clone(),
            )))
        } else {
            info!("🛰️ MONITOR: Push monitor disabled in configuration");
            None
        };

        let pool = Arc::new(BoundedWorkerPool::new(
            "launch",
            config.orchestrator.worker_pool_size,
            config.orchestrator.launch_queue_capacity,
            config.orchestrator.rejection_policy,
        ));
        let orchestrator = OrchestratorService::new(Arc::clone(&registry), Arc::clone(&bus), pool, Arc::clone(&config));
        let db_events = Arc::new(DbEventManager::new(
            Arc::clone(&bus),
            config.messaging.db_event_exchange.clone(),
        ));

        let system_id = Uuid::new_v4();
        info!(
            system_id = %system_id,
            gateway_id = %config.gateway_id,
            bus = bus.provider_name(),
            "✅ CORE: System context initialized"
        );

        Ok(Self {
            system_id,
            config_manager,
            registry,
            bus,
            services,
            db_events,
            workflow_manager,
            orchestrator,
            pull_monitor,
            push_monitor,
            status_submitter,
            status_receiver: Mutex::new(Some(status_receiver)),
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.config_manager.config()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the consumer and monitor loops; fails when already started
    pub fn start(&self) -> Result<()> {
        let receiver = self
            .status_receiver
            .lock()
            .take()
            .ok_or_else(|| OrchestratorError::Internal("system context already started".to_string()))?;
        let mut handles = self.handles.lock();

        let submitter = Arc::clone(&self.status_submitter);
        handles.push(tokio::spawn(submitter.run(receiver, self.shutdown.clone())));

        let manager = self.workflow_manager.clone();
        let token = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = manager.run(token).await {
                error!(error = %e, "🔄 PROCESS: Workflow manager stopped with error");
            }
        }));

        let orchestrator = self.orchestrator.clone();
        let token = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = orchestrator.run_status_listener(token).await {
                error!(error = %e, "🧪 EXPERIMENT: Status listener stopped with error");
            }
        }));

        let orchestrator = self.orchestrator.clone();
        let token = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = orchestrator.run_experiment_listener(token).await {
                error!(error = %e, "🧪 EXPERIMENT: Launch listener stopped with error");
            }
        }));

        handles.push(tokio::spawn(
            Arc::clone(&self.pull_monitor).run(self.shutdown.clone()),
        ));
        if let Some(push) = &self.push_monitor {
            handles.push(tokio::spawn(Arc::clone(push).run(self.shutdown.clone())));
        }

        info!(loops = handles.len(), "🚀 CORE: Background loops started");
        Ok(())
    }

    /// Cancel every loop and running workflow, then drain the launch pool
    pub async fn shutdown(&self) {
        info!("🛑 CORE: Shutting down");
        self.shutdown.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }
        self.orchestrator.pool().shutdown().await;
        info!("🛑 CORE: Shutdown complete");
    }
}
