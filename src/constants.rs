//! # System Constants
//!
//! API version, exchange names, routing keys and the status-change reasons
//! written into the registry.

/// Version reported by `get_api_version`
pub const ORCHESTRATOR_API_VERSION: &str = "0.18.0";

/// Exchanges, queues and routing keys on the message bus
pub mod messaging {
    pub const STATUS_EXCHANGE: &str = "status_exchange";
    pub const PROCESS_LAUNCH_EXCHANGE: &str = "process_exchange";
    pub const EXPERIMENT_EXCHANGE: &str = "experiment_exchange";
    pub const DB_EVENT_EXCHANGE: &str = "db.event.exchange";
    pub const JOB_STATUS_TOPIC: &str = "monitoring-data";

    pub const EXPERIMENT_LAUNCH_QUEUE: &str = "experiment.launch.queue";
    pub const PROCESS_LAUNCH_QUEUE: &str = "process.launch.queue";
    pub const ORCHESTRATOR_STATUS_QUEUE: &str = "orchestrator.status.queue";

    pub const EXPERIMENT_LAUNCH_ROUTING_KEY: &str = "experiment.launch";
    pub const EXPERIMENT_CANCEL_ROUTING_KEY: &str = "experiment.cancel";
    pub const PROCESS_LAUNCH_ROUTING_KEY: &str = "process.launch";
    pub const PROCESS_TERMINATE_ROUTING_KEY: &str = "process.terminate";

    /// Binding that selects process status events (`gateway.experiment.process`)
    pub const PROCESS_STATUS_BINDING: &str = "*.*.*";

    /// Prefix for parser trigger routing keys
    pub const PARSING_ROUTING_PREFIX: &str = "parsing";
}

/// Reasons recorded alongside status changes
pub mod reasons {
    pub const SUBMITTED_ALL_PROCESSES: &str = "submitted all processes";
    pub const LAUNCH_VALIDATION_FAILED: &str = "Experiment validation failed";
    pub const CANCEL_REQUESTED: &str = "Experiment cancel request processed";
    pub const PROCESS_CANCEL_REQUESTED: &str = "Process cancel request received";
    pub const CANCEL_COMPLETED: &str = "Process cancellation completed";
    pub const JOB_SUBMITTED: &str = "Job submitted to the resource manager";
    pub const JOB_UNREACHABLE: &str = "Resource manager no longer knows the job";
}

/// Task names used in task DAGs and workflow node ids
pub mod task_names {
    pub const ENV_SETUP: &str = "env-setup";
    pub const INPUT_DATA_STAGING: &str = "input-staging";
    pub const JOB_SUBMISSION: &str = "job-submission";
    pub const JOB_VERIFICATION: &str = "job-verification";
    pub const OUTPUT_DATA_STAGING: &str = "output-staging";
    pub const ARCHIVE: &str = "archive";
    pub const COMPLETING: &str = "completing";
    pub const PARSING_TRIGGERING: &str = "parsing-triggering";
    pub const WORKFLOW_CANCELLATION: &str = "workflow-cancellation";
    pub const REMOTE_JOB_CANCELLATION: &str = "remote-job-cancellation";
    pub const CANCEL_COMPLETING: &str = "cancel-completing";
}
