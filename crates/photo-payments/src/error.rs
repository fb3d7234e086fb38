//! Payment Error Types

use std::time::Duration;

use photo_core::StudioError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Server call failed
    #[error(transparent)]
    Studio(#[from] StudioError),

    /// Provider reported the payment as canceled or failed
    #[error("Payment not completed: {0}")]
    NotCompleted(String),

    /// No definitive answer before the wait deadline
    #[error("Payment not confirmed within {0:?}")]
    DeadlineExceeded(Duration),

    /// Payment creation response lacks what the provider hand-off needs
    #[error("Payment response missing {0}")]
    MissingField(&'static str),

    /// No hand-off configured for the requested provider
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Unknown pricing tier
    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    /// Wallet connection or transfer failed
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Opening the hosted checkout page failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Opening the chat invoice failed
    #[error("Invoice error: {0}")]
    Invoice(String),

    /// Operation not valid in the current state
    #[error("Invalid payment state: {0}")]
    InvalidState(String),

    /// The attempt was cancelled by the user while this call was in flight
    #[error("Payment attempt cancelled")]
    Cancelled,
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Studio(e) => e.is_retryable(),
            Self::Wallet(_) | Self::Navigation(_) | Self::Invoice(_) => true,
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Studio(e) => e.user_message(),
            Self::NotCompleted(_) => "Payment was not completed.".into(),
            Self::DeadlineExceeded(_) => {
                "We could not confirm your payment in time. If you were charged, your photos will appear once it settles.".into()
            }
            Self::ProviderUnavailable(_) => "This payment method is not available right now.".into(),
            Self::UnknownTier(_) => "This package is no longer available.".into(),
            Self::Wallet(_) => "The wallet did not complete the transfer.".into(),
            Self::Navigation(_) | Self::Invoice(_) => "Could not open the payment page. Please try again.".into(),
            Self::Cancelled => "Payment cancelled.".into(),
            _ => "An error occurred processing your payment.".into(),
        }
    }
}
