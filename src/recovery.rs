use crate::config::RecoveryConfig;
use crate::error::{CameraError, ErrorKind};
use std::time::Duration;
use tracing::{error, info, warn};

/// Recovery action to take after a lifecycle failure
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Schedule an automatic retry after the delay
    RetryAfterDelay(Duration),
    /// Surface the error and wait for an explicit retry from the user
    AwaitUser,
    /// Retry budget exhausted
    GiveUp,
}

/// Backoff settings for automatic retries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_backoff: true,
        }
    }
}

impl From<&RecoveryConfig> for RetryPolicy {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_backoff: config.exponential_backoff,
        }
    }
}

/// Tracks retry attempts for the camera session
#[derive(Debug)]
pub struct RecoveryManager {
    policy: RetryPolicy,
    retry_count: u32,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_count: 0,
        }
    }

    /// Determine recovery action for a failed transition
    pub fn handle_error(&mut self, error: &CameraError) -> RecoveryAction {
        match error.kind() {
            ErrorKind::PermissionDenied | ErrorKind::HardwareUnavailable => {
                warn!("Non-recoverable camera error, waiting for user: {}", error);
                return RecoveryAction::AwaitUser;
            }
            ErrorKind::InvalidStateTransition => return RecoveryAction::AwaitUser,
            ErrorKind::TransientPlatformFailure => {}
        }

        if self.retry_count >= self.policy.max_retries {
            error!(
                "Maximum retries ({}) exceeded for camera: {}",
                self.policy.max_retries, error
            );
            return RecoveryAction::GiveUp;
        }

        let delay = self.calculate_delay(self.retry_count);
        self.retry_count += 1;

        info!(
            "Scheduling camera recovery (attempt {}/{}) in {:?}: {}",
            self.retry_count, self.policy.max_retries, delay, error
        );

        RecoveryAction::RetryAfterDelay(delay)
    }

    /// Reset the retry budget after a successful initialize
    pub fn reset(&mut self) {
        if self.retry_count > 0 {
            info!("Camera recovered successfully, reset retry count");
        }
        self.retry_count = 0;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn has_exceeded_retry_limit(&self) -> bool {
        self.retry_count >= self.policy.max_retries
    }

    fn calculate_delay(&self, retry_count: u32) -> Duration {
        if !self.policy.exponential_backoff {
            return self.policy.base_delay;
        }

        let factor = 2u32.saturating_pow(retry_count);
        self.policy
            .base_delay
            .checked_mul(factor)
            .map(|delay| delay.min(self.policy.max_delay))
            .unwrap_or(self.policy.max_delay)
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
