//! Backoff policy for rate-limited generation.
//!
//! A rate-limited model is retried up to `attempt_cap` times with a fixed
//! wait in between; a model still rate limited at the cap is abandoned after
//! a cooldown, unless it is the last model.

use crate::config::GenerationSettings;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts per model while it keeps answering rate-limited.
    pub attempt_cap: u32,
    /// Wait between two attempts on the same model.
    pub rate_limit_backoff: Duration,
    /// Wait before moving past a model that stayed rate limited.
    pub model_cooldown: Duration,
}

impl BackoffPolicy {
    pub fn new(settings: &GenerationSettings) -> Self {
        Self {
            attempt_cap: settings.attempt_cap.max(1),
            rate_limit_backoff: settings.rate_limit_backoff,
            model_cooldown: settings.model_cooldown,
        }
    }

    /// Whether a rate-limited `attempt` (1-based) may be followed by another
    /// attempt on the same model.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempt_cap
    }

    /// Cooldown owed after abandoning the model at `model_index`, none after
    /// the last model.
    pub fn cooldown_after(&self, model_index: usize, model_count: usize) -> Option<Duration> {
        if model_index + 1 < model_count {
            Some(self.model_cooldown)
        } else {
            None
        }
    }

    /// Total wait spent when every one of `model_count` models stays rate
    /// limited through all its attempts.
    pub fn min_exhaustion_wait(&self, model_count: usize) -> Duration {
        if model_count == 0 {
            return Duration::ZERO;
        }
        let retries = model_count as u32 * self.attempt_cap.saturating_sub(1);
        self.rate_limit_backoff * retries + self.model_cooldown * (model_count as u32 - 1)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempt_cap: 2,
            rate_limit_backoff: Duration::from_secs(30),
            model_cooldown: Duration::from_secs(10),
        }
    }
}

/// Source of waits, so backoff can be exercised without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested wait.
#[derive(Default)]
pub struct InstantSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}
