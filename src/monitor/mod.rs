//! # Job Status Monitor
//!
//! Pull and push monitors that observe remote jobs and feed the shared
//! validate-then-publish [`pipeline`].

pub mod errors;
pub mod parser;
pub mod pipeline;
pub mod pull;
pub mod push;
pub mod result;
pub mod status_mapping;
pub mod tracker;
pub mod validator;

pub use errors::{MonitorError, MonitorResult};
pub use parser::{JsonStatusParser, MessageParser, ParserRegistry, PbsEmailParser, SlurmEmailParser};
pub use pipeline::{PostWorkflowLauncher, StatusPipeline, StatusSubmitter};
pub use pull::{PollSummary, PullMonitor};
pub use push::{BatchSummary, PushMonitor};
pub use result::JobStatusResult;
pub use status_mapping::{map_fork_state, map_pbs_state, map_provider_code, map_slurm_state, map_state};
pub use tracker::{JobTracker, TrackedJob};
pub use validator::{JobStatusValidator, ValidatedJobStatus};
