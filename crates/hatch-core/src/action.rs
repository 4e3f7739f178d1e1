//! Action contract and the retrying runner.
//!
//! An action is one named operation executed against a container at a
//! lifecycle phase. The runner owns retry, per-attempt timeout and
//! inter-attempt delay; actions themselves only perform a single attempt.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hatch_common::events::ContainerEmitter;
use hatch_common::{ActionSpec, Params};

/// Retry settings shared by every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionConfig {
    /// Attempt budget, at least 1.
    pub retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(1),
            delay: Duration::from_millis(250),
        }
    }
}

impl ActionConfig {
    /// Merge a declaration over plugin defaults.
    pub fn from_spec(spec: &ActionSpec, defaults: ActionConfig) -> ActionConfig {
        ActionConfig {
            retries: spec.retries.unwrap_or(defaults.retries).max(1),
            timeout: spec
                .timeout
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            delay: spec
                .delay
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("attempt timed out")]
    Timeout,

    #[error("canceled")]
    Canceled,
}

impl ActionError {
    pub fn failed(err: impl fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

/// A single lifecycle operation against one container.
#[async_trait]
pub trait Action: Send + Sync {
    fn config(&self) -> &ActionConfig;

    /// One attempt. The runner applies timeout and retries around it.
    async fn run(&self, params: &Params) -> Result<(), ActionError>;
}

/// Execute `action` under its retry policy.
///
/// Stops at the first success, at cancellation, or once the attempt budget
/// is exhausted (reporting the last error). Timed-out attempts are abandoned;
/// a late result from one is never observed.
pub async fn run_action(
    phase: &'static str,
    name: &str,
    action: &dyn Action,
    params: &Params,
    cancel: &CancellationToken,
    emitter: &ContainerEmitter,
) -> Result<(), ActionError> {
    let config = *action.config();
    let attempts = config.retries.max(1);
    let mut last = ActionError::Failed("action did not run".to_string());

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(ActionError::Canceled);
        }

        emitter.action_attempt(phase, name, attempt, attempts);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ActionError::Canceled),
            outcome = tokio::time::timeout(config.timeout, action.run(params)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ActionError::Timeout),
                }
            }
        };

        emitter.action_result(
            phase,
            name,
            attempt,
            attempts,
            result.as_ref().err().map(|e| e as &dyn fmt::Display),
        );

        match result {
            Ok(()) => return Ok(()),
            Err(ActionError::Canceled) => return Err(ActionError::Canceled),
            Err(err) => last = err,
        }

        if attempt < attempts && !config.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ActionError::Canceled),
                _ = tokio::time::sleep(config.delay) => {}
            }
        }
    }

    Err(last)
}
