//! Job creation retry
//!
//! Payment confirmation can lag a redirect by a few seconds, so job creation
//! retries on `PaymentNotConfirmed` only. Any other error is final.

use std::time::Duration;

use photo_core::{CreateJobRequest, CreatedJob, StudioApi, StudioConfig};

use crate::error::{GenerationError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StudioConfig::default())
    }
}

impl From<&StudioConfig> for RetryPolicy {
    fn from(config: &StudioConfig) -> Self {
        Self {
            max_attempts: config.job_create_attempts,
            delay: config.job_create_retry_delay,
        }
    }
}

/// `POST /generation-jobs` under `policy`
pub async fn create_job_with_retry(
    api: &dyn StudioApi,
    request: &CreateJobRequest,
    policy: RetryPolicy,
) -> Result<CreatedJob> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match api.create_generation_job(request).await {
            Ok(job) => {
                tracing::info!(job_id = %job.job_id, avatar_id = %request.avatar_id, attempt, "Generation job created");
                return Ok(job);
            }
            Err(e) if e.is_payment_not_confirmed() => {
                if attempt < attempts {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay = ?policy.delay,
                        "Payment not confirmed yet, retrying job creation"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(attempts, avatar_id = %request.avatar_id, "Payment never confirmed");
    Err(GenerationError::PaymentNotConfirmed { attempts })
}
