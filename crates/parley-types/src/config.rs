//! Runtime configuration types for parley.
//!
//! `ParleyConfig` mirrors `parley.toml`. Every field has a default, so an
//! empty file (or no file at all) yields a working, unbounded configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest concurrency ceiling or mailbox capacity the runtime can enforce.
///
/// Matches `tokio::sync::Semaphore::MAX_PERMITS`, which also bounds mpsc
/// channel buffers.
pub const MAX_CAPACITY: usize = usize::MAX >> 3;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl ParleyConfig {
    /// Reject values that would make the engine unable to make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ceiling) = self.dispatch.max_bot_concurrency {
            check_capacity("dispatch.max_bot_concurrency", ceiling)?;
        }
        check_capacity("sessions.mailbox_capacity", self.sessions.mailbox_capacity)?;
        if self.sessions.max_sessions == Some(0) {
            return Err(ConfigError::Invalid(
                "sessions.max_sessions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_capacity(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
    }
    if value > MAX_CAPACITY {
        return Err(ConfigError::Invalid(format!(
            "{field} must be at most {MAX_CAPACITY}"
        )));
    }
    Ok(())
}

/// Clamp a capacity into `1..=MAX_CAPACITY`.
fn clamp_capacity(value: usize) -> usize {
    value.clamp(1, MAX_CAPACITY)
}

/// Stateless dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Ceiling on concurrently running handler units. `None` = unbounded.
    #[serde(default)]
    pub max_bot_concurrency: Option<usize>,

    /// What to do when the ceiling is reached.
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl DispatchConfig {
    /// The ceiling the dispatcher enforces, clamped into `1..=MAX_CAPACITY`.
    pub fn effective_ceiling(&self) -> Option<usize> {
        self.max_bot_concurrency.map(clamp_capacity)
    }
}

/// Behaviour of the stateless dispatcher when the ceiling is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Wait for a free slot; the update source is held back meanwhile.
    #[default]
    Block,
    /// Fail immediately with `DispatchError::Backpressure`.
    Reject,
}

/// Chat session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-session mailbox size. Delivering to a full mailbox waits.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Ceiling on live sessions. `None` = unbounded.
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

fn default_mailbox_capacity() -> usize {
    64
}

impl SessionConfig {
    /// The mailbox size sessions use, clamped into `1..=MAX_CAPACITY`.
    pub fn effective_mailbox_capacity(&self) -> usize {
        clamp_capacity(self.mailbox_capacity)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            max_sessions: None,
        }
    }
}
