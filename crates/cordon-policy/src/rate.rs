//! Per-agent sliding-window rate accounting and byte caps.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use cordon_core::{AgentId, SecurityError, Timestamp, ValidationError};

use crate::config::PolicyConfig;

/// Sliding minute window in milliseconds.
const MINUTE_WINDOW_MS: i64 = 60_000;

/// Sliding hour window in milliseconds.
const HOUR_WINDOW_MS: i64 = 3_600_000;

/// Per-agent request timestamps, pruned lazily on each check.
#[derive(Debug, Default)]
struct AgentRateState {
    minute: VecDeque<i64>,
    hour: VecDeque<i64>,
}

impl AgentRateState {
    fn prune(&mut self, now_ms: i64) {
        while self
            .minute
            .front()
            .is_some_and(|&t| now_ms - t >= MINUTE_WINDOW_MS)
        {
            self.minute.pop_front();
        }
        while self
            .hour
            .front()
            .is_some_and(|&t| now_ms - t >= HOUR_WINDOW_MS)
        {
            self.hour.pop_front();
        }
    }
}

/// Sliding-window operation budgets plus the pure byte-cap guards.
///
/// State is a per-agent timestamp list behind one mutex; critical sections
/// are a prune and a compare, never held across I/O.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_minute: u32,
    max_per_hour: Option<u32>,
    max_file_size: u64,
    max_batch_size: u64,
    max_batch_operations: Option<usize>,
    agents: Mutex<HashMap<AgentId, AgentRateState>>,
}

impl RateLimiter {
    /// Build the limiter from compiled policy.
    #[must_use]
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            max_per_minute: policy.max_ops_per_minute,
            max_per_hour: policy.max_ops_per_hour,
            max_file_size: policy.max_file_size,
            max_batch_size: policy.max_batch_size,
            max_batch_operations: policy.max_batch_operations,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether the agent has budget at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::RateLimit`] when either window is full.
    pub fn check(&self, agent: &AgentId, now: Timestamp) -> Result<(), SecurityError> {
        let now_ms = now.millis();
        let mut agents = self
            .agents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = agents.entry(agent.clone()).or_default();
        state.prune(now_ms);

        if state.minute.len() >= self.max_per_minute as usize {
            return Err(SecurityError::RateLimit {
                agent: agent.to_string(),
            });
        }
        if let Some(max_hour) = self.max_per_hour {
            if state.hour.len() >= max_hour as usize {
                return Err(SecurityError::RateLimit {
                    agent: agent.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Record a successful admission at `now`.
    pub fn record(&self, agent: &AgentId, now: Timestamp) {
        let now_ms = now.millis();
        let mut agents = self
            .agents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = agents.entry(agent.clone()).or_default();
        state.minute.push_back(now_ms);
        state.hour.push_back(now_ms);
    }

    /// Reject a single file larger than the configured cap.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::FileSizeExceeded`].
    pub fn guard_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size > self.max_file_size {
            return Err(ValidationError::FileSizeExceeded {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Reject a batch whose cumulative bytes or op count exceed the caps.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BatchSizeExceeded`] for the byte cap and
    /// [`ValidationError::InvalidArgument`] for the op-count cap.
    pub fn guard_batch(&self, total_bytes: u64, op_count: usize) -> Result<(), ValidationError> {
        if total_bytes > self.max_batch_size {
            return Err(ValidationError::BatchSizeExceeded {
                total: total_bytes,
                limit: self.max_batch_size,
            });
        }
        if let Some(max_ops) = self.max_batch_operations {
            if op_count > max_ops {
                return Err(ValidationError::InvalidArgument {
                    reason: format!("batch has {op_count} operations, cap is {max_ops}"),
                });
            }
        }
        Ok(())
    }
}
