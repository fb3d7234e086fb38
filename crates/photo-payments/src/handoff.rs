//! Provider Hand-off Surfaces
//!
//! Each provider hands the user to a different external surface. The
//! orchestrator only talks to these traits; the chat-platform and wallet SDK
//! bindings implement them outside this crate.
//!
//! ```text
//! HostedRedirect ──▶ Navigator::open_external      (process likely terminates)
//! ChatInvoice    ──▶ InvoiceSurface::open_invoice   (closed event races the status poll)
//! WalletTransfer ──▶ WalletConnector                (session signal, then one transfer)
//! ```

pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;

/// Opens the hosted checkout page, leaving the app
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn open_external(&self, url: &str) -> Result<()>;
}

/// Status the chat platform reports when the invoice sheet closes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Cancelled,
    Failed,
    Pending,
}

/// Shows an in-chat invoice
///
/// The platform's "invoice closed" callback is delivered back through
/// `PaymentOrchestrator::invoice_closed`.
#[async_trait]
pub trait InvoiceSurface: Send + Sync {
    async fn open_invoice(&self, invoice_ref: &str) -> Result<()>;
}

/// A connected wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    pub address: String,
}

/// Transfer the user is asked to sign
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Destination address returned by payment creation
    pub to: String,
    pub amount: Decimal,
    /// Comment attached to the transfer so the server can match it
    pub payload: String,
}

impl TransferRequest {
    /// Amount in nano units (1 TON = 10^9 nano)
    pub fn amount_nano(&self) -> Option<u64> {
        (self.amount * Decimal::from(1_000_000_000u64)).trunc().to_u64()
    }
}

/// Reference to a signed transfer, returned by the wallet
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRef(pub String);

impl std::fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// External crypto wallet
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Reactive session signal; `None` while disconnected
    fn session(&self) -> watch::Receiver<Option<WalletSession>>;

    /// Ask the user to connect a wallet (may leave the app)
    async fn request_connection(&self) -> Result<()>;

    /// Ask the user to sign one transfer
    async fn send_transfer(&self, request: &TransferRequest) -> Result<TransactionRef>;
}
