//! Caller-side retry of provisioning runs.
//!
//! The engine never retries on its own. [`apply_with_retry`] re-invokes
//! `apply` with the partial state carried by a transient failure, so each
//! attempt resumes from the last converged node.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ApplyReport, Provisioner};
use crate::core::StateMap;
use crate::errors::InfraflowError;
use crate::graph::ResourceGraph;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for retrying runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of runs, including the first.
    pub max_attempts: usize,
    /// Base delay between runs in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates the default retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// Progress of a retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Number of retries already scheduled.
    pub retries: usize,
    previous_delay: Option<u64>,
}

impl RetryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `max_attempts` runs have been made.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.retries + 1 >= config.max_attempts
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let retries = u32::try_from(self.retries).unwrap_or(u32::MAX);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retries)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retries) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full if delay == 0 => 0,
            JitterStrategy::Full => rand::thread_rng().gen_range(0..=delay),
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay = Some(jittered);
        self.retries += 1;
        Duration::from_millis(jittered)
    }
}

/// Runs `apply`, retrying transient node failures.
///
/// Each retry passes the failed run's state back in, so converged nodes are
/// not provisioned again. Structural errors and non-transient provider
/// failures are returned immediately.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-retryable error.
pub async fn apply_with_retry(
    provisioner: &Provisioner,
    graph: &ResourceGraph,
    existing: StateMap,
    config: &RetryConfig,
) -> Result<ApplyReport, InfraflowError> {
    let mut retry = RetryState::new();
    let mut state = existing;

    loop {
        match provisioner.apply(graph, state).await {
            Ok(report) => return Ok(report),
            Err(InfraflowError::Provision(err))
                if err.cause.is_transient() && !retry.is_exhausted(config) =>
            {
                let delay = retry.next_delay(config);
                debug!(
                    node_id = %err.id,
                    retry = retry.retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err.cause,
                    "Retrying provisioning run after transient failure"
                );
                state = err.state;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(retries = retry.retries, error = %e, "Giving up on provisioning run");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10000)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_exhaustion_counts_the_first_run() {
        let config = RetryConfig::new().with_max_attempts(3).with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        assert!(!state.is_exhausted(&config));
        state.next_delay(&config);
        assert!(!state.is_exhausted(&config));
        state.next_delay(&config);
        assert!(state.is_exhausted(&config));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(300)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        assert_eq!(state.next_delay(&config), Duration::from_millis(100));
        assert_eq!(state.next_delay(&config), Duration::from_millis(200));
        assert_eq!(state.next_delay(&config), Duration::from_millis(300));
    }

    #[test]
    fn test_linear_and_constant_backoff() {
        let linear = RetryConfig::new()
            .with_base_delay_ms(50)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();
        assert_eq!(state.next_delay(&linear), Duration::from_millis(50));
        assert_eq!(state.next_delay(&linear), Duration::from_millis(100));

        let constant = linear.with_backoff(BackoffStrategy::Constant);
        let mut state = RetryState::new();
        state.next_delay(&constant);
        assert_eq!(state.next_delay(&constant), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::new().with_base_delay_ms(100).with_max_delay_ms(1000);
        for jitter in [JitterStrategy::Full, JitterStrategy::Equal, JitterStrategy::Decorrelated] {
            let config = config.clone().with_jitter(jitter);
            let mut state = RetryState::new();
            for _ in 0..5 {
                assert!(state.next_delay(&config) <= Duration::from_millis(1000));
            }
        }
    }
}
