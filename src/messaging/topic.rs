//! # Job Status Topic
//!
//! Offset-addressed log consumed by the push monitor. A consumer polls a
//! batch, processes it and commits the next offset; uncommitted records are
//! handed out again after `rewind_to_committed`.

use super::errors::{MessagingError, MessagingResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    pub offset: u64,
    /// Producer-supplied key; the push monitor uses it to pick a parser
    pub key: Option<String>,
    pub payload: String,
}

#[async_trait]
pub trait TopicConsumer: Send + Sync + 'static {
    /// Wait up to `timeout` for records and return at most `max_records`
    async fn poll(&self, max_records: usize, timeout: Duration) -> MessagingResult<Vec<TopicRecord>>;

    /// Mark every record below `next_offset` as processed
    async fn commit(&self, next_offset: u64) -> MessagingResult<()>;

    fn committed_offset(&self) -> u64;

    /// Move the fetch position back to the last commit
    fn rewind_to_committed(&self);
}

#[derive(Debug, Default)]
struct TopicState {
    records: Vec<TopicRecord>,
    position: u64,
    committed: u64,
}

/// Single-partition in-memory topic with one consumer position
#[derive(Debug, Default)]
pub struct InMemoryTopic {
    name: String,
    state: Mutex<TopicState>,
    notify: Notify,
}

impl InMemoryTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TopicState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record and return its offset
    pub fn produce(&self, key: Option<&str>, payload: impl Into<String>) -> u64 {
        let offset = {
            let mut state = self.state.lock();
            let offset = state.records.len() as u64;
            state.records.push(TopicRecord {
                offset,
                key: key.map(str::to_string),
                payload: payload.into(),
            });
            offset
        };
        self.notify.notify_one();
        offset
    }

    pub fn end_offset(&self) -> u64 {
        self.state.lock().records.len() as u64
    }

    fn take_batch(&self, max_records: usize) -> Vec<TopicRecord> {
        let mut state = self.state.lock();
        let start = state.position as usize;
        let end = (start + max_records).min(state.records.len());
        let batch = state.records[start..end].to_vec();
        state.position = end as u64;
        batch
    }
}

#[async_trait]
impl TopicConsumer for InMemoryTopic {
    async fn poll(&self, max_records: usize, timeout: Duration) -> MessagingResult<Vec<TopicRecord>> {
        let deadline = Instant::now() + timeout;
        loop {
            let batch = self.take_batch(max_records);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(self.take_batch(max_records));
            }
        }
    }

    async fn commit(&self, next_offset: u64) -> MessagingResult<()> {
        let mut state = self.state.lock();
        let end = state.records.len() as u64;
        if next_offset > end {
            return Err(MessagingError::InvalidOffset {
                offset: next_offset,
                end,
            });
        }
        state.committed = state.committed.max(next_offset);
        Ok(())
    }

    fn committed_offset(&self) -> u64 {
        self.state.lock().committed
    }

    fn rewind_to_committed(&self) {
        let mut state = self.state.lock();
        state.position = state.committed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_respects_batch_size() {
        let topic = InMemoryTopic::new("monitoring-data");
        for i in 0..5 {
            topic.produce(None, format!("record-{i}"));
        }
        let first = topic.poll(3, Duration::from_millis(5)).await.unwrap();
        assert_eq!(first.len(), 3);
        let second = topic.poll(3, Duration::from_millis(5)).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].offset, 3);
    }

    #[tokio::test]
    async fn test_commit_and_rewind() {
        let topic = InMemoryTopic::new("monitoring-data");
        topic.produce(Some("slurm"), "a");
        topic.produce(Some("slurm"), "b");

        let batch = topic.poll(10, Duration::from_millis(5)).await.unwrap();
        topic.commit(batch[0].offset + 1).await.unwrap();
        topic.rewind_to_committed();

        let again = topic.poll(10, Duration::from_millis(5)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].payload, "b");
        assert!(topic.commit(10).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_poll_times_out() {
        let topic = InMemoryTopic::new("monitoring-data");
        let batch = topic.poll(10, Duration::from_millis(5)).await.unwrap();
        assert!(batch.is_empty());
    }
}
