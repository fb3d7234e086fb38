//! Studio API Strategy
//!
//! The server endpoints the client-side orchestration consumes. The HTTP
//! implementation lives in `photo-runtime`; everything else is written
//! against this trait so it runs without a network.
//!
//! ```text
//! POST /payments                 -> CreatedPayment
//! GET  /payments/{id}/status     -> PaymentStatus
//! POST /generation-jobs          -> CreatedJob | PAYMENT_REQUIRED
//! GET  /generation-jobs/{id}     -> JobStatus
//! GET  /buyers/{id}/avatars      -> [Avatar]
//! ```

pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    Avatar, AvatarId, BuyerId, GenerationStatus, JobId, JobProgress, PaymentId,
    PaymentProvider, TierId,
};

/// Body of `POST /payments`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub tier_id: TierId,
    pub photo_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_id: Option<AvatarId>,
    pub provider: PaymentProvider,
    pub buyer_id: BuyerId,
    /// Price shown to the user, so the server can reject a stale quote
    #[serde(with = "rust_decimal::serde::str")]
    pub quoted_amount: Decimal,
    pub currency: String,
}

/// Response of `POST /payments`; which optional field is set depends on the provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayment {
    pub payment_id: PaymentId,
    #[serde(default)]
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub invoice_ref: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Provider-side status of a payment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatusKind {
    #[default]
    Pending,
    Succeeded,
    Canceled,
    Failed,
}

/// Response of `GET /payments/{id}/status`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub paid: bool,
    #[serde(default)]
    pub status: PaymentStatusKind,
}

impl PaymentStatus {
    pub const fn pending() -> Self {
        Self {
            paid: false,
            status: PaymentStatusKind::Pending,
        }
    }

    pub const fn paid() -> Self {
        Self {
            paid: true,
            status: PaymentStatusKind::Succeeded,
        }
    }

    pub const fn with_status(status: PaymentStatusKind) -> Self {
        Self {
            paid: false,
            status,
        }
    }

    /// Provider reported a terminal failure
    pub const fn is_failed(&self) -> bool {
        !self.paid && matches!(self.status, PaymentStatusKind::Canceled | PaymentStatusKind::Failed)
    }
}

/// Body of `POST /generation-jobs`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub avatar_id: AvatarId,
    pub requested_count: u32,
    pub use_stored_references: bool,
}

/// Response of `POST /generation-jobs`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedJob {
    pub job_id: JobId,
}

/// Response of `GET /generation-jobs/{id}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: GenerationStatus,
    #[serde(default)]
    pub progress: JobProgress,
    /// Full list of asset URLs produced so far, in generation order
    #[serde(default)]
    pub assets: Vec<String>,
}

/// Strategy trait for the studio server
#[async_trait]
pub trait StudioApi: Send + Sync {
    /// Create a server-side payment record for a tier
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreatedPayment>;

    /// Fetch the provider-side status of a payment
    async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus>;

    /// Start a generation job; fails with `PaymentNotConfirmed` until the payment settles
    async fn create_generation_job(&self, request: &CreateJobRequest) -> Result<CreatedJob>;

    /// Fetch the status and assets of a generation job
    async fn generation_job(&self, job_id: &JobId) -> Result<JobStatus>;

    /// List the buyer's avatars (server truth)
    async fn list_avatars(&self, buyer_id: &BuyerId) -> Result<Vec<Avatar>>;
}
