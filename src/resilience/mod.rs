//! # Resilience Module
//!
//! Bounded retry with exponential backoff, shared by task retries, status
//! publishing and monitor submissions.

pub mod retry;

pub use retry::{retry_with_backoff, BackoffConfig, RetryDecision};
