use super::task_failure;
use crate::messaging::{MessageContext, MessageEvent, ParsingTriggerEvent};
use crate::workflow::context::TaskContext;
use crate::workflow::errors::WorkflowResult;
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;

/// Announces finished outputs to downstream parser services
#[derive(Debug, Default)]
pub struct ParsingTriggeringTask;

impl ParsingTriggeringTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let event = MessageEvent::ParsingTrigger(ParsingTriggerEvent {
            process_identity: context.identity.clone(),
            outputs: context.process.process_outputs.clone(),
        });
        let message = MessageContext::new(event, context.identity.gateway_id.clone());
        let config = &context.services.config;
        context
            .services
            .publisher
            .publish_with_retry(&message, config.monitor.publish_retries, &config.executor.backoff)
            .await?;
        context.log_step("Parsing triggered");
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for ParsingTriggeringTask {
    fn task_type(&self) -> TaskType {
        TaskType::ParsingTriggering
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
