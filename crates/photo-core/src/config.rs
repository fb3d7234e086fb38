//! Studio Configuration
//!
//! Timing constants for payment and generation waits, overridable from the
//! environment (`PHOTO_*`).

use std::time::Duration;

use crate::error::{Result, StudioError};

/// Client orchestration configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudioConfig {
    /// Base URL of the studio server
    pub api_base_url: String,

    /// Cadence of `GET /payments/{id}/status` while waiting on a chat invoice
    pub payment_poll_interval: Duration,

    /// Hard limit on the chat-invoice wait
    pub payment_poll_deadline: Duration,

    /// Cadence of `GET /generation-jobs/{id}`
    pub generation_poll_interval: Duration,

    /// Hard limit on the generation wait
    pub generation_poll_deadline: Duration,

    /// Attempts at `POST /generation-jobs` while the payment is unconfirmed
    pub job_create_attempts: u32,

    /// Delay between those attempts
    pub job_create_retry_delay: Duration,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            payment_poll_interval: Duration::from_secs(3),
            payment_poll_deadline: Duration::from_secs(5 * 60),
            generation_poll_interval: Duration::from_secs(3),
            generation_poll_deadline: Duration::from_secs(15 * 60),
            job_create_attempts: 3,
            job_create_retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl StudioConfig {
    /// Defaults overridden by `PHOTO_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let secs = |name: &str, default: Duration| -> Result<Duration> {
            lookup(name).map_or(Ok(default), |raw| {
                raw.trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| StudioError::Config(format!("{name} must be a positive integer, got {raw:?}")))
            })
        };

        let job_create_attempts = match lookup("PHOTO_JOB_CREATE_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    StudioError::Config(format!(
                        "PHOTO_JOB_CREATE_ATTEMPTS must be a positive integer, got {raw:?}"
                    ))
                })?,
            None => defaults.job_create_attempts,
        };

        Ok(Self {
            api_base_url: lookup("PHOTO_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            payment_poll_interval: secs("PHOTO_PAYMENT_POLL_SECS", defaults.payment_poll_interval)?,
            payment_poll_deadline: secs("PHOTO_PAYMENT_DEADLINE_SECS", defaults.payment_poll_deadline)?,
            generation_poll_interval: secs("PHOTO_GENERATION_POLL_SECS", defaults.generation_poll_interval)?,
            generation_poll_deadline: secs(
                "PHOTO_GENERATION_DEADLINE_SECS",
                defaults.generation_poll_deadline,
            )?,
            job_create_attempts,
            job_create_retry_delay: secs("PHOTO_JOB_CREATE_RETRY_SECS", defaults.job_create_retry_delay)?,
            request_timeout: secs("PHOTO_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
        })
    }
}
