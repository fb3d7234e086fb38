//! Error Types for Generation

use std::time::Duration;

use photo_core::{JobId, StudioError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Api(#[from] StudioError),

    #[error("Payment still not confirmed after {attempts} attempts")]
    PaymentNotConfirmed { attempts: u32 },

    #[error("Job {job_id} did not finish within {deadline:?}")]
    DeadlineExceeded { job_id: JobId, deadline: Duration },

    #[error("Job {0} failed")]
    JobFailed(JobId),

    #[error("Invalid launch URL: {0}")]
    InvalidLaunchUrl(#[from] url::ParseError),
}

impl GenerationError {
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_retryable(),
            Self::PaymentNotConfirmed { .. } | Self::DeadlineExceeded { .. } => true,
            Self::JobFailed(_) | Self::InvalidLaunchUrl(_) => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Api(e) => e.user_message(),
            Self::PaymentNotConfirmed { .. } => {
                "Your payment has not been confirmed yet. Please check again in a minute.".into()
            }
            Self::DeadlineExceeded { .. } => {
                "Your photos are taking longer than expected. They will appear in your gallery when ready.".into()
            }
            Self::JobFailed(_) => "Photo generation failed. Your credit has been kept.".into(),
            Self::InvalidLaunchUrl(_) => "Could not read the link this app was opened with.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_payment_wait_is_retryable_later() {
        let err = GenerationError::PaymentNotConfirmed { attempts: 3 };
        assert!(err.is_retryable());
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn job_failure_is_final() {
        assert!(!GenerationError::JobFailed(JobId::new("j1")).is_retryable());
    }
}
