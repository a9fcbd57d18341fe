//! Provisioning of resource graphs.
//!
//! This module provides:
//! - The [`Provisioner`] engine
//! - Configuration hashing used as the idempotence key
//! - Caller-side retry of runs with backoff and jitter

mod engine;
mod hashing;
mod retry;

pub use engine::{ApplyReport, NodeAction, Provisioner};
pub use hashing::config_hash;
pub use retry::{apply_with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryState};
