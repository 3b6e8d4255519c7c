//! Pluggable parsers for pushed job status messages.

use super::errors::{MonitorError, MonitorResult};
use super::result::JobStatusResult;
use super::status_mapping::map_slurm_state;
use crate::models::JobManagerType;
use crate::state_machine::JobState;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns one raw pushed message into a status report
pub trait MessageParser: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn parse(&self, payload: &str) -> MonitorResult<JobStatusResult>;
}

/// Payload is a serialized [`JobStatusResult`]
#[derive(Debug, Default)]
pub struct JsonStatusParser;

impl MessageParser for JsonStatusParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, payload: &str) -> MonitorResult<JobStatusResult> {
        let result: JobStatusResult =
            serde_json::from_str(payload).map_err(|e| MonitorError::parse(self.name(), e.to_string()))?;
        if result.job_id.trim().is_empty() {
            return Err(MonitorError::parse(self.name(), "empty job id"));
        }
        Ok(result)
    }
}

fn compile(parser: &'static str, pattern: &str) -> MonitorResult<Regex> {
    Regex::new(pattern).map_err(|e| MonitorError::parse(parser, e.to_string()))
}

/// SLURM notification mail, e.g.
/// `Slurm Job_id=1234 Name=A1234 Ended, Run time 00:01:00, COMPLETED, ExitCode 0`
#[derive(Debug)]
pub struct SlurmEmailParser {
    subject: Regex,
}

impl SlurmEmailParser {
    pub fn new() -> MonitorResult<Self> {
        Ok(Self {
            subject: compile("slurm_email", r"Job_id=(?P<id>\d+)\s+Name=(?P<name>\S+)\s+(?P<rest>.*)")?,
        })
    }

    fn state_from(rest: &str) -> JobState {
        let mut parts = rest.split(',').map(str::trim);
        let event = parts.next().unwrap_or_default();
        match event.split_whitespace().next().unwrap_or_default() {
            "Began" => JobState::Active,
            "Failed" => JobState::Failed,
            "Requeued" => JobState::Queued,
            "TIME" => JobState::Failed,
            "Ended" | "Cancelled" | "CANCELLED" => parts
                .filter_map(|part| part.split_whitespace().next())
                .map(map_slurm_state)
                .find(|state| *state != JobState::Unknown)
                .unwrap_or(if event.starts_with("Ended") {
                    JobState::Complete
                } else {
                    JobState::Canceled
                }),
            _ => JobState::Unknown,
        }
    }
}

impl MessageParser for SlurmEmailParser {
    fn name(&self) -> &'static str {
        "slurm_email"
    }

    fn parse(&self, payload: &str) -> MonitorResult<JobStatusResult> {
        let captures = self
            .subject
            .captures(payload)
            .ok_or_else(|| MonitorError::parse(self.name(), "no Job_id in message"))?;
        let rest = captures.name("rest").map_or("", |m| m.as_str());
        Ok(JobStatusResult::new(&captures["id"], &captures["name"], Self::state_from(rest))
            .with_reason(rest.trim())
            .published_by(self.name()))
    }
}

/// PBS notification mail with `Job Id:` / `Job Name:` lines
#[derive(Debug)]
pub struct PbsEmailParser {
    job_id: Regex,
    job_name: Regex,
    exit_status: Regex,
}

impl PbsEmailParser {
    pub fn new() -> MonitorResult<Self> {
        Ok(Self {
            job_id: compile("pbs_email", r"Job Id:\s*(\S+)")?,
            job_name: compile("pbs_email", r"Job Name:\s*(\S+)")?,
            exit_status: compile("pbs_email", r"Exit_status=(-?\d+)")?,
        })
    }
}

impl MessageParser for PbsEmailParser {
    fn name(&self) -> &'static str {
        "pbs_email"
    }

    fn parse(&self, payload: &str) -> MonitorResult<JobStatusResult> {
        let job_id = self
            .job_id
            .captures(payload)
            .map(|c| c[1].to_string())
            .ok_or_else(|| MonitorError::parse(self.name(), "no Job Id in message"))?;
        let job_name = self
            .job_name
            .captures(payload)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        let state = if payload.contains("Begun execution") {
            JobState::Active
        } else if payload.contains("Execution terminated") {
            match self.exit_status.captures(payload).map(|c| c[1].to_string()) {
                Some(code) if code == "0" => JobState::Complete,
                Some(_) => JobState::Failed,
                None => JobState::Complete,
            }
        } else if payload.contains("Aborted by PBS Server") {
            JobState::Failed
        } else if payload.contains("job deleted") || payload.contains("deleted at request") {
            JobState::Canceled
        } else {
            JobState::Unknown
        };

        Ok(JobStatusResult::new(job_id, job_name, state).published_by(self.name()))
    }
}

/// Parsers keyed by record key; records without a key use `json`
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn MessageParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("keys", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ParserRegistry {
    pub const DEFAULT_KEY: &'static str = "json";

    /// `json`, plus the email parsers under their job manager names
    pub fn with_defaults() -> MonitorResult<Self> {
        let mut registry = Self::default();
        registry.register(Self::DEFAULT_KEY, Arc::new(JsonStatusParser));
        registry.register(JobManagerType::Slurm.to_string(), Arc::new(SlurmEmailParser::new()?));
        registry.register(JobManagerType::Pbs.to_string(), Arc::new(PbsEmailParser::new()?));
        Ok(registry)
    }

    pub fn register(&mut self, key: impl Into<String>, parser: Arc<dyn MessageParser>) {
        self.parsers.insert(key.into(), parser);
    }

    pub fn parser_for(&self, key: Option<&str>) -> MonitorResult<Arc<dyn MessageParser>> {
        let lookup = key.unwrap_or(Self::DEFAULT_KEY).to_ascii_lowercase();
        self.parsers
            .get(&lookup)
            .cloned()
            .ok_or_else(|| MonitorError::NoParser {
                key: key.map(str::to_string),
            })
    }

    pub fn for_job_manager(&self, manager: JobManagerType) -> MonitorResult<Arc<dyn MessageParser>> {
        self.parser_for(Some(&manager.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_parser() {
        let payload = r#"{"job_id":"42","job_name":"A42","state":"active"}"#;
        let result = JsonStatusParser.parse(payload).unwrap();
        assert_eq!(result.job_id, "42");
        assert_eq!(result.state, JobState::Active);
        assert!(JsonStatusParser.parse("not json").is_err());
    }

    #[test]
    fn test_slurm_email_states() {
        let parser = SlurmEmailParser::new().unwrap();
        let ended = parser
            .parse("Subject: Slurm Job_id=1234 Name=A1234 Ended, Run time 00:01:00, COMPLETED, ExitCode 0")
            .unwrap();
        assert_eq!(ended.job_id, "1234");
        assert_eq!(ended.job_name, "A1234");
        assert_eq!(ended.state, JobState::Complete);

        let failed = parser
            .parse("Slurm Job_id=1235 Name=A1235 Failed, Run time 00:00:10, FAILED, ExitCode 1")
            .unwrap();
        assert_eq!(failed.state, JobState::Failed);

        let began = parser
            .parse("Slurm Job_id=1236 Name=A1236 Began, Queued time 00:00:01")
            .unwrap();
        assert_eq!(began.state, JobState::Active);

        assert!(parser.parse("Hello there").is_err());
    }

    #[test]
    fn test_pbs_email_states() {
        let parser = PbsEmailParser::new().unwrap();
        let body = "PBS Job Id: 77.server\nJob Name:   A77\nExecution terminated\nExit_status=0\n";
        let result = parser.parse(body).unwrap();
        assert_eq!(result.job_id, "77.server");
        assert_eq!(result.job_name, "A77");
        assert_eq!(result.state, JobState::Complete);

        let failed = parser
            .parse("PBS Job Id: 78.server\nJob Name: A78\nExecution terminated\nExit_status=271\n")
            .unwrap();
        assert_eq!(failed.state, JobState::Failed);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ParserRegistry::with_defaults().unwrap();
        assert_eq!(registry.parser_for(None).unwrap().name(), "json");
        assert_eq!(registry.parser_for(Some("SLURM")).unwrap().name(), "slurm_email");
        assert_eq!(
            registry.for_job_manager(JobManagerType::Pbs).unwrap().name(),
            "pbs_email"
        );
        assert!(matches!(
            registry.parser_for(Some("email")),
            Err(MonitorError::NoParser { .. })
        ));
    }
}
