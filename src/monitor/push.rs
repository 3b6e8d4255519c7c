//! Consumer loop for pushed job status messages.

use super::errors::MonitorResult;
use super::parser::ParserRegistry;
use super::pipeline::StatusPipeline;
use crate::config::PushMonitorConfig;
use crate::messaging::{TopicConsumer, TopicRecord};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one consumed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub submitted: usize,
    pub dropped: usize,
    pub failed: usize,
}

pub struct PushMonitor {
    consumer: Arc<dyn TopicConsumer>,
    parsers: ParserRegistry,
    pipeline: StatusPipeline,
    config: PushMonitorConfig,
}

impl PushMonitor {
    pub fn new(
        consumer: Arc<dyn TopicConsumer>,
        parsers: ParserRegistry,
        pipeline: StatusPipeline,
        config: PushMonitorConfig,
    ) -> Self {
        Self {
            consumer,
            parsers,
            pipeline,
            config,
        }
    }

    /// Poll one batch, hand each record to the pipeline, then commit past it
    ///
    /// A record that cannot be parsed or is dropped by validation is logged
    /// and skipped. A transient failure stops the batch: the commit ends
    /// before that record and the consumer rewinds so it is read again.
    pub async fn process_batch(&self) -> MonitorResult<BatchSummary> {
        let records = self
            .consumer
            .poll(self.config.max_poll_records.max(1), self.config.poll_timeout())
            .await?;
        let mut summary = BatchSummary {
            received: records.len(),
            ..BatchSummary::default()
        };
        let Some(mut next_offset) = records.last().map(|record| record.offset + 1) else {
            return Ok(summary);
        };

        let mut stopped = false;
        for record in &records {
            match self.process_record(record).await {
                Ok(true) => summary.submitted += 1,
                Ok(false) => {
                    warn!(offset = record.offset, "Pushed job status dropped by validation");
                    summary.dropped += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(offset = record.offset, error = %e, "Pushed job status will be read again");
                    summary.failed += 1;
                    next_offset = record.offset;
                    stopped = true;
                    break;
                }
                Err(e) => {
                    error!(offset = record.offset, key = ?record.key, error = %e, "Failed to process pushed job status");
                    summary.failed += 1;
                }
            }
        }

        self.consumer.commit(next_offset).await?;
        if stopped {
            self.consumer.rewind_to_committed();
        }
        debug!(?summary, next_offset, "Push monitor batch committed");
        Ok(summary)
    }

    async fn process_record(&self, record: &TopicRecord) -> MonitorResult<bool> {
        let parser = self.parsers.parser_for(record.key.as_deref())?;
        let result = parser.parse(&record.payload)?;
        debug!(
            job_id = %result.job_id,
            state = %result.state,
            parser = parser.name(),
            "Parsed pushed job status"
        );
        self.pipeline.submit(result).await
    }

    /// Consume batches until `token` is cancelled
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(
            max_poll_records = self.config.max_poll_records,
            "🛰️ MONITOR: Push monitor started"
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                batch = self.process_batch() => {
                    if let Err(e) = batch {
                        error!(error = %e, "Push monitor batch failed");
                        tokio::time::sleep(self.config.poll_timeout()).await;
                    }
                }
            }
        }
        info!("🛰️ MONITOR: Push monitor stopped");
    }
}
