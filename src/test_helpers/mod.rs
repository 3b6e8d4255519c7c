//! Shared fixtures for unit tests: an in-memory registry and bus, a scripted
//! Slurm adaptor and a seeded experiment ready to launch.

mod mock_adaptor;

pub use mock_adaptor::MockComputeAdaptor;

use crate::adaptor::StaticAdaptorResolver;
use crate::config::{OrchestratorConfig, RejectionPolicy};
use crate::messaging::{EventPublisher, InMemoryMessageBus, MessageBus, ProcessIdentifier};
use crate::models::{
    ApplicationDeployment, BatchQueue, ComputeResourceDescription, ExperimentModel, GroupResourceProfile,
    InputDataObject, JobManagerType, OutputDataObject, ProcessModel,
};
use crate::monitor::JobTracker;
use crate::orchestrator::{BoundedWorkerPool, OrchestratorService};
use crate::registry::{InMemoryRegistry, RegistryClient};
use crate::resilience::BackoffConfig;
use crate::state_machine::{ProcessState, ProcessStateMachine};
use crate::workflow::{RunningWorkflows, TaskServices, WorkflowExecutor, WorkflowManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const GATEWAY_ID: &str = "test-gateway";
pub const EXPERIMENT_ID: &str = "EXP_test";
pub const GROUP_PROFILE_ID: &str = "group-profile-1";
pub const COMPUTE_RESOURCE_ID: &str = "slurm-cluster";
pub const APP_MODULE_ID: &str = "app-module-1";
pub const DEPLOYMENT_ID: &str = "deployment-1";
pub const CREDENTIAL_TOKEN: &str = "token-1";
pub const QUEUE_NAME: &str = "normal";

/// Configuration with immediate retries and small queues
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        gateway_id: GATEWAY_ID.to_string(),
        ..OrchestratorConfig::default()
    };
    config.executor.backoff = BackoffConfig::immediate();
    config.executor.max_task_retries = 1;
    config.monitor.poll_interval_ms = 10;
    config.monitor.publish_retries = 2;
    config.monitor.push.poll_timeout_ms = 10;
    config.orchestrator.worker_pool_size = 2;
    config.orchestrator.launch_queue_capacity = 16;
    config.orchestrator.rejection_policy = RejectionPolicy::Wait;
    config
}

pub struct TestHarness {
    pub registry: Arc<InMemoryRegistry>,
    pub bus: Arc<InMemoryMessageBus>,
    pub adaptor: Arc<MockComputeAdaptor>,
    pub services: Arc<TaskServices>,
    pub config: Arc<OrchestratorConfig>,
    pub shutdown: CancellationToken,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(InMemoryRegistry::new());
        let bus = Arc::new(InMemoryMessageBus::new(config.messaging.channel_capacity));
        let adaptor = Arc::new(MockComputeAdaptor::new());

        let registry_dyn: Arc<dyn RegistryClient> = registry.clone();
        let bus_dyn: Arc<dyn MessageBus> = bus.clone();
        let publisher = EventPublisher::new(bus_dyn, config.messaging.status_exchange.clone());
        let process_state = ProcessStateMachine::new(
            Arc::clone(&registry_dyn),
            publisher.clone(),
            config.monitor.publish_retries,
            config.executor.backoff.clone(),
        );
        let services = Arc::new(TaskServices {
            registry: registry_dyn,
            publisher,
            process_state,
            adaptors: Arc::new(StaticAdaptorResolver::single(adaptor.clone())),
            job_tracker: Arc::new(JobTracker::new()),
            workflows: Arc::new(RunningWorkflows::new()),
            config: Arc::clone(&config),
        });

        Self {
            registry,
            bus,
            adaptor,
            services,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry_client(&self) -> Arc<dyn RegistryClient> {
        self.registry.clone()
    }

    pub fn message_bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    pub fn executor(&self) -> Arc<WorkflowExecutor> {
        Arc::new(WorkflowExecutor::new(Arc::clone(&self.services), self.shutdown.clone()))
    }

    pub fn workflow_manager(&self) -> WorkflowManager {
        WorkflowManager::new(self.executor(), self.message_bus())
    }

    /// Orchestrator with its own launch pool; needs a tokio runtime
    pub fn orchestrator(&self) -> OrchestratorService {
        let pool = Arc::new(BoundedWorkerPool::new(
            "test-launch",
            self.config.orchestrator.worker_pool_size,
            self.config.orchestrator.launch_queue_capacity,
            self.config.orchestrator.rejection_policy,
        ));
        OrchestratorService::new(self.registry_client(), self.message_bus(), pool, Arc::clone(&self.config))
    }

    /// Write a process status through the guarded state machine
    pub async fn set_process_state(&self, process: &ProcessModel, state: ProcessState) {
        let identity = ProcessIdentifier::new(&process.process_id, &process.experiment_id, &process.gateway_id);
        self.services
            .process_state
            .transition(&identity, state, None)
            .await
            .unwrap();
    }

    /// Seed the resources an experiment needs and the experiment itself
    pub fn seed_experiment(&self) -> ExperimentModel {
        self.registry.insert_group_resource_profile(GroupResourceProfile {
            group_resource_profile_id: GROUP_PROFILE_ID.to_string(),
            gateway_id: GATEWAY_ID.to_string(),
            default_credential_store_token: Some(CREDENTIAL_TOKEN.to_string()),
            ..GroupResourceProfile::default()
        });
        self.registry.insert_compute_resource(ComputeResourceDescription {
            compute_resource_id: COMPUTE_RESOURCE_ID.to_string(),
            host_name: "login.cluster.example.org".to_string(),
            job_manager: JobManagerType::Slurm,
            scratch_location: "/scratch/gateway".to_string(),
            batch_queues: vec![BatchQueue {
                queue_name: QUEUE_NAME.to_string(),
                max_nodes: 4,
                max_processors: 64,
                max_run_time: 120,
            }],
        });
        self.registry.insert_application_deployment(ApplicationDeployment {
            app_deployment_id: DEPLOYMENT_ID.to_string(),
            app_module_id: APP_MODULE_ID.to_string(),
            compute_host_id: COMPUTE_RESOURCE_ID.to_string(),
            executable_path: "/opt/apps/simulate".to_string(),
            module_load_commands: vec!["module load simulate".to_string()],
            ..ApplicationDeployment::default()
        });

        let mut experiment = ExperimentModel::new(EXPERIMENT_ID, GATEWAY_ID, "alice");
        experiment.execution_id = Some(APP_MODULE_ID.to_string());
        let user_config = &mut experiment.user_configuration;
        user_config.group_resource_profile_id = Some(GROUP_PROFILE_ID.to_string());
        user_config.resource_host_id = Some(COMPUTE_RESOURCE_ID.to_string());
        user_config.queue_name = Some(QUEUE_NAME.to_string());
        user_config.node_count = 1;
        user_config.total_cpu_count = 16;
        user_config.wall_time_limit = 30;
        user_config.experiment_data_dir = Some(format!("/data/{EXPERIMENT_ID}"));
        experiment.experiment_inputs = vec![InputDataObject::uri("structure", "file:///inputs/water.xyz").required()];
        experiment.experiment_outputs = vec![OutputDataObject::uri("log", "run.log")];

        self.registry.insert_experiment(experiment.clone());
        experiment
    }
}

/// Seeded experiment with one process whose deployment is resolved
pub async fn launchable_process(harness: &TestHarness) -> ProcessModel {
    let experiment = harness.seed_experiment();
    let mut process = crate::orchestrator::service::build_process(&experiment);
    process.compute_resource_id = Some(COMPUTE_RESOURCE_ID.to_string());
    process.application_deployment_id = Some(DEPLOYMENT_ID.to_string());
    harness.registry.insert_process(process.clone());
    process
}
