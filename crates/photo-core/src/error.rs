//! Error Types

use thiserror::Error;

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Error code the server returns while a payment has not settled yet
pub const PAYMENT_REQUIRED_CODE: &str = "PAYMENT_REQUIRED";

/// Studio error types
#[derive(Error, Debug)]
pub enum StudioError {
    /// Transport-level failure (connection reset, DNS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("API error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Server has not confirmed the payment backing this request yet
    #[error("Payment not yet confirmed")]
    PaymentNotConfirmed,

    /// Requested entity does not exist on the server
    #[error("Not found: {0}")]
    NotFound(String),

    /// Durable storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation is not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl StudioError {
    /// Build an API error, mapping the payment-required code to its own variant
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        if code == PAYMENT_REQUIRED_CODE {
            return Self::PaymentNotConfirmed;
        }
        Self::Api {
            status,
            code,
            message: message.into(),
        }
    }

    /// Check if error is transient (worth another probe)
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the server reported that the payment has not settled
    pub const fn is_payment_not_confirmed(&self) -> bool {
        matches!(self, Self::PaymentNotConfirmed)
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::Io(_) => {
                "Connection problem. Please check your network and try again.".into()
            }
            Self::Api { message, .. } if !message.is_empty() => {
                format!("The server rejected the request: {message}")
            }
            Self::PaymentNotConfirmed => {
                "Your payment has not been confirmed yet. Please try again in a moment.".into()
            }
            Self::NotFound(_) => "The requested item could not be found.".into(),
            Self::Storage(_) => "Could not save your progress on this device.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
