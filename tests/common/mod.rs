//! Shared fixtures for integration tests: a scripted Slurm cluster, seeded
//! registry resources and polling helpers.

#![allow(dead_code)]

pub mod strategies;

use airavata_core::adaptor::{AdaptorResult, CommandOutput, ComputeAdaptor, StaticAdaptorResolver};
use airavata_core::config::{ConfigManager, OrchestratorConfig, RejectionPolicy};
use airavata_core::messaging::{InMemoryMessageBus, InMemoryTopic, MessageBus};
use airavata_core::models::{
    ApplicationDeployment, BatchQueue, ComputeResourceDescription, ExperimentModel, GroupResourceProfile,
    InputDataObject, JobManagerType, OutputDataObject,
};
use airavata_core::registry::{InMemoryRegistry, RegistryClient};
use airavata_core::resilience::BackoffConfig;
use airavata_core::system_context::{Backends, SystemContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const GATEWAY_ID: &str = "it-gateway";
pub const GROUP_PROFILE_ID: &str = "it-group-profile";
pub const COMPUTE_RESOURCE_ID: &str = "it-slurm";
pub const APP_MODULE_ID: &str = "it-app";
pub const DEPLOYMENT_ID: &str = "it-deployment";
pub const QUEUE_NAME: &str = "normal";

/// Immediate retries, fast polls and a small launch pool
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        gateway_id: GATEWAY_ID.to_string(),
        ..OrchestratorConfig::default()
    };
    config.executor.backoff = BackoffConfig::immediate();
    config.executor.max_task_retries = 1;
    config.monitor.poll_interval_ms = 20;
    config.monitor.max_consecutive_failures = 2;
    config.monitor.publish_retries = 2;
    config.monitor.push.poll_timeout_ms = 20;
    config.orchestrator.worker_pool_size = 2;
    config.orchestrator.launch_queue_capacity = 16;
    config.orchestrator.rejection_policy = RejectionPolicy::Wait;
    config
}

/// A tiny Slurm cluster: `sbatch` hands out job ids, `sacct` reports the
/// scripted state of each job and `scancel` can be told to fail.
#[derive(Debug)]
pub struct ScriptedSlurm {
    commands: Mutex<Vec<String>>,
    files: Mutex<BTreeSet<String>>,
    states: Mutex<HashMap<String, String>>,
    next_job_id: AtomicU64,
    fail_kills: AtomicBool,
}

impl Default for ScriptedSlurm {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            files: Mutex::new(BTreeSet::new()),
            states: Mutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(5000),
            fail_kills: AtomicBool::new(false),
        }
    }
}

impl ScriptedSlurm {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn commands_starting_with(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }

    /// Number of `sbatch` submissions seen
    pub fn submissions(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.contains("sbatch "))
            .count()
    }

    pub fn submitted_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.states.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn set_state(&self, job_id: &str, code: &str) {
        self.states.lock().insert(job_id.to_string(), code.to_string());
    }

    /// Forget a job so that `sacct` stops reporting it
    pub fn forget(&self, job_id: &str) {
        self.states.lock().remove(job_id);
    }

    pub fn fail_kills(&self, fail: bool) {
        self.fail_kills.store(fail, Ordering::SeqCst);
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.lock().contains(path)
    }

    fn sacct(&self, command: &str) -> CommandOutput {
        let ids = command.rsplit("-j ").next().unwrap_or_default();
        let states = self.states.lock();
        let lines: Vec<String> = ids
            .split(',')
            .map(str::trim)
            .filter_map(|id| states.get(id).map(|state| format!("{id}|{state}")))
            .collect();
        CommandOutput::success(lines.join("\n"))
    }
}

#[async_trait]
impl ComputeAdaptor for ScriptedSlurm {
    async fn execute_command(&self, command: &str, _working_dir: Option<&str>) -> AdaptorResult<CommandOutput> {
        self.commands.lock().push(command.to_string());
        if command.contains("sbatch ") {
            let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst).to_string();
            self.set_state(&job_id, "PENDING");
            return Ok(CommandOutput::success(format!("Submitted batch job {job_id}\n")));
        }
        if command.starts_with("sacct ") {
            return Ok(self.sacct(command));
        }
        if let Some(job_id) = command.strip_prefix("scancel ") {
            if self.fail_kills.load(Ordering::SeqCst) {
                return Ok(CommandOutput::failure("scancel: error: Kill job error", 1));
            }
            self.set_state(job_id.trim(), "CANCELLED");
        }
        Ok(CommandOutput::success(""))
    }

    async fn create_directory(&self, path: &str) -> AdaptorResult<()> {
        self.files.lock().insert(path.to_string());
        Ok(())
    }

    async fn copy_file(&self, _source: &str, destination: &str) -> AdaptorResult<()> {
        self.files.lock().insert(destination.to_string());
        Ok(())
    }

    async fn write_file(&self, path: &str, _contents: &str) -> AdaptorResult<()> {
        self.files.lock().insert(path.to_string());
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

/// Group profile, Slurm resource and deployment every experiment here uses
pub fn seed_resources(registry: &InMemoryRegistry) {
    registry.insert_group_resource_profile(GroupResourceProfile {
        group_resource_profile_id: GROUP_PROFILE_ID.to_string(),
        gateway_id: GATEWAY_ID.to_string(),
        default_credential_store_token: Some("it-token".to_string()),
        ..GroupResourceProfile::default()
    });
    registry.insert_compute_resource(ComputeResourceDescription {
        compute_resource_id: COMPUTE_RESOURCE_ID.to_string(),
        host_name: "login.it.example.org".to_string(),
        job_manager: JobManagerType::Slurm,
        scratch_location: "/scratch/it".to_string(),
        batch_queues: vec![BatchQueue {
            queue_name: QUEUE_NAME.to_string(),
            max_nodes: 8,
            max_processors: 128,
            max_run_time: 240,
        }],
    });
    registry.insert_application_deployment(ApplicationDeployment {
        app_deployment_id: DEPLOYMENT_ID.to_string(),
        app_module_id: APP_MODULE_ID.to_string(),
        compute_host_id: COMPUTE_RESOURCE_ID.to_string(),
        executable_path: "/opt/apps/gaussian".to_string(),
        ..ApplicationDeployment::default()
    });
}

/// A launchable single-application experiment
pub fn experiment(experiment_id: &str) -> ExperimentModel {
    let mut experiment = ExperimentModel::new(experiment_id, GATEWAY_ID, "it-user");
    experiment.execution_id = Some(APP_MODULE_ID.to_string());
    let user_config = &mut experiment.user_configuration;
    user_config.group_resource_profile_id = Some(GROUP_PROFILE_ID.to_string());
    user_config.resource_host_id = Some(COMPUTE_RESOURCE_ID.to_string());
    user_config.queue_name = Some(QUEUE_NAME.to_string());
    user_config.node_count = 1;
    user_config.total_cpu_count = 8;
    user_config.wall_time_limit = 60;
    experiment.experiment_inputs = vec![InputDataObject::uri("input", "file:///inputs/molecule.com").required()];
    experiment.experiment_outputs = vec![OutputDataObject::uri("log", "molecule.log")];
    experiment
}

/// Running system context over in-memory backends and a scripted cluster
pub struct TestSystem {
    pub context: SystemContext,
    pub registry: Arc<InMemoryRegistry>,
    pub bus: Arc<InMemoryMessageBus>,
    pub topic: Arc<InMemoryTopic>,
    pub cluster: Arc<ScriptedSlurm>,
}

impl TestSystem {
    pub async fn start(config: OrchestratorConfig) -> Self {
        let registry = Arc::new(InMemoryRegistry::new());
        seed_resources(&registry);
        let bus = Arc::new(InMemoryMessageBus::new(config.messaging.channel_capacity));
        let topic = Arc::new(InMemoryTopic::new(config.messaging.job_status_topic.clone()));
        let cluster = Arc::new(ScriptedSlurm::default());

        let backends = Backends {
            registry: registry.clone(),
            bus: bus.clone(),
            adaptors: Arc::new(StaticAdaptorResolver::single(cluster.clone())),
            job_status_topic: topic.clone(),
        };
        let manager = ConfigManager::from_config(config).expect("valid test configuration");
        let context = SystemContext::with_backends(manager, backends)
            .await
            .expect("system context");
        context.start().expect("background loops");

        let system = Self {
            context,
            registry,
            bus,
            topic,
            cluster,
        };
        system.await_consumers().await;
        system
    }

    /// Wait until every consumer declared its queue, otherwise early
    /// publishes are unroutable
    async fn await_consumers(&self) {
        use airavata_core::constants::messaging as keys;
        let bus: Arc<dyn MessageBus> = self.bus.clone();
        for queue in [
            keys::PROCESS_LAUNCH_QUEUE,
            keys::ORCHESTRATOR_STATUS_QUEUE,
            keys::EXPERIMENT_LAUNCH_QUEUE,
        ] {
            let bus = Arc::clone(&bus);
            wait_until(&format!("queue {queue} declared"), move || {
                let bus = Arc::clone(&bus);
                async move { bus.queue_stats(queue).await.is_ok() }
            })
            .await;
        }
    }

    pub fn add_experiment(&self, experiment: ExperimentModel) {
        self.registry.insert_experiment(experiment);
    }

    pub async fn only_process_id(&self, experiment_id: &str) -> String {
        let processes = self
            .registry
            .get_processes_for_experiment(experiment_id)
            .await
            .expect("registry");
        assert_eq!(processes.len(), 1, "expected exactly one process");
        processes[0].process_id.clone()
    }

    pub async fn stop(self) {
        tokio::time::timeout(Duration::from_secs(10), self.context.shutdown())
            .await
            .expect("shutdown in time");
    }
}

/// Poll `condition` every 10ms for up to five seconds
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
