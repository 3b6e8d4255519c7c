//! Message envelopes and event payloads carried on the bus.

use crate::constants::messaging as keys;
use crate::models::OutputDataObject;
use crate::state_machine::{ExperimentState, JobState, ProcessState, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Experiment,
    ExperimentCancel,
    LaunchProcess,
    TerminateProcess,
    Process,
    Task,
    Job,
    DbEvent,
    Parsing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentIdentifier {
    pub experiment_id: String,
    pub gateway_id: String,
}

impl ExperimentIdentifier {
    pub fn new(experiment_id: impl Into<String>, gateway_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            gateway_id: gateway_id.into(),
        }
    }

    pub fn routing_key(&self) -> String {
        format!("{}.{}", self.gateway_id, self.experiment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentifier {
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
}

impl ProcessIdentifier {
    pub fn new(
        process_id: impl Into<String>,
        experiment_id: impl Into<String>,
        gateway_id: impl Into<String>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            experiment_id: experiment_id.into(),
            gateway_id: gateway_id.into(),
        }
    }

    pub fn routing_key(&self) -> String {
        format!("{}.{}.{}", self.gateway_id, self.experiment_id, self.process_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentifier {
    pub task_id: String,
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
}

impl TaskIdentifier {
    pub fn routing_key(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.gateway_id, self.experiment_id, self.process_id, self.task_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentifier {
    pub job_id: String,
    pub task_id: String,
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
}

impl JobIdentifier {
    pub fn routing_key(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.gateway_id, self.experiment_id, self.process_id, self.task_id, self.job_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatusChangeEvent {
    pub state: ExperimentState,
    pub experiment_id: String,
    pub gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatusChangeEvent {
    pub state: ProcessState,
    pub process_identity: ProcessIdentifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusChangeEvent {
    pub state: TaskState,
    pub task_identity: TaskIdentifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusChangeEvent {
    pub state: JobState,
    pub job_identity: JobIdentifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSubmitEvent {
    pub experiment_id: String,
    pub gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSubmitEvent {
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTerminateEvent {
    pub process_id: String,
    pub gateway_id: String,
    pub token_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudType {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbEventMessage {
    pub publisher_service: String,
    pub entity_type: String,
    pub crud_type: CrudType,
    pub entity: serde_json::Value,
}

/// Parser services pick up finished process outputs from this event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingTriggerEvent {
    pub process_identity: ProcessIdentifier,
    pub outputs: Vec<OutputDataObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageEvent {
    ExperimentStatusChange(ExperimentStatusChangeEvent),
    ProcessStatusChange(ProcessStatusChangeEvent),
    TaskStatusChange(TaskStatusChangeEvent),
    JobStatusChange(JobStatusChangeEvent),
    ExperimentSubmit(ExperimentSubmitEvent),
    ExperimentCancel(ExperimentSubmitEvent),
    ProcessSubmit(ProcessSubmitEvent),
    ProcessTerminate(ProcessTerminateEvent),
    DbEvent(DbEventMessage),
    ParsingTrigger(ParsingTriggerEvent),
}

impl MessageEvent {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ExperimentStatusChange(_) | Self::ExperimentSubmit(_) => MessageType::Experiment,
            Self::ExperimentCancel(_) => MessageType::ExperimentCancel,
            Self::ProcessStatusChange(_) => MessageType::Process,
            Self::TaskStatusChange(_) => MessageType::Task,
            Self::JobStatusChange(_) => MessageType::Job,
            Self::ProcessSubmit(_) => MessageType::LaunchProcess,
            Self::ProcessTerminate(_) => MessageType::TerminateProcess,
            Self::DbEvent(_) => MessageType::DbEvent,
            Self::ParsingTrigger(_) => MessageType::Parsing,
        }
    }

    /// Routing key the event is published under
    ///
    /// Db events are routed by the DB event manager, which knows the
    /// subscriber list; here they fall back to the publisher name.
    pub fn routing_key(&self) -> String {
        match self {
            Self::ExperimentStatusChange(event) => {
                format!("{}.{}", event.gateway_id, event.experiment_id)
            }
            Self::ProcessStatusChange(event) => event.process_identity.routing_key(),
            Self::TaskStatusChange(event) => event.task_identity.routing_key(),
            Self::JobStatusChange(event) => event.job_identity.routing_key(),
            Self::ExperimentSubmit(_) => keys::EXPERIMENT_LAUNCH_ROUTING_KEY.to_string(),
            Self::ExperimentCancel(_) => keys::EXPERIMENT_CANCEL_ROUTING_KEY.to_string(),
            Self::ProcessSubmit(_) => keys::PROCESS_LAUNCH_ROUTING_KEY.to_string(),
            Self::ProcessTerminate(_) => keys::PROCESS_TERMINATE_ROUTING_KEY.to_string(),
            Self::DbEvent(event) => event.publisher_service.clone(),
            Self::ParsingTrigger(event) => format!(
                "{}.{}",
                keys::PARSING_ROUTING_PREFIX,
                event.process_identity.routing_key()
            ),
        }
    }
}

/// Envelope for everything published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContext {
    pub message_id: String,
    pub message_type: MessageType,
    pub gateway_id: String,
    pub updated_time: DateTime<Utc>,
    pub event: MessageEvent,
}

impl MessageContext {
    pub fn new(event: MessageEvent, gateway_id: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            message_type: event.message_type(),
            gateway_id: gateway_id.into(),
            updated_time: Utc::now(),
            event,
        }
    }

    pub fn routing_key(&self) -> String {
        self.event.routing_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_keys_by_depth() {
        let process = ProcessIdentifier::new("p1", "e1", "gw");
        assert_eq!(process.routing_key(), "gw.e1.p1");

        let job = JobIdentifier {
            job_id: "42".to_string(),
            task_id: "t1".to_string(),
            process_id: "p1".to_string(),
            experiment_id: "e1".to_string(),
            gateway_id: "gw".to_string(),
        };
        assert_eq!(job.routing_key(), "gw.e1.p1.t1.42");
        assert_eq!(ExperimentIdentifier::new("e1", "gw").routing_key(), "gw.e1");
    }

    #[test]
    fn test_envelope_round_trip_keeps_type() {
        let message = MessageContext::new(
            MessageEvent::ProcessSubmit(ProcessSubmitEvent {
                process_id: "p1".to_string(),
                experiment_id: "e1".to_string(),
                gateway_id: "gw".to_string(),
                token_id: "token".to_string(),
            }),
            "gw",
        );
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"kind\":\"process_submit\""));
        let parsed: MessageContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.message_type, MessageType::LaunchProcess);
        assert_eq!(parsed, message);
    }
}
