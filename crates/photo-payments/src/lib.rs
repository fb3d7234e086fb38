//! # photo-payments
//!
//! Payment flows for the photo studio mini-app.
//!
//! ## Providers
//!
//! Three providers hand the user off in very different ways, and the
//! orchestrator has to survive each of them.
//!
//! ### 1. Hosted redirect (card checkout)
//!
//! **Flow:** App → hosted checkout page → app relaunched with a resume marker
//!
//! ```text
//! ┌─────────────┐  persist   ┌─────────────────┐  relaunch  ┌──────────────────┐
//! │  Tier form  │──────────▶ │  Hosted Checkout │──────────▶│ Resume coordinator│
//! └─────────────┘  intent    └─────────────────┘  ?resume=1 └──────────────────┘
//! ```
//!
//! The process usually dies during the redirect, so the intent record is
//! written before navigation and the next launch picks it up.
//!
//! ### 2. Chat invoice
//!
//! **Flow:** Invoice sheet shown in chat; the server is polled until it
//! reports the payment paid, canceled or failed, while the platform's
//! "invoice closed" callback races the poll.
//!
//! ```text
//!                  ┌─── status poll (3s, 5min deadline) ───┐
//! ChatInvoiceWait ─┤                                       ├─▶ Success | Error
//!                  └─── invoice_closed(status) ────────────┘
//! ```
//!
//! ### 3. Wallet transfer
//!
//! **Flow:** Connect wallet (may leave the app) → create payment → user signs
//! one transfer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use photo_payments::{PaymentOrchestrator, PurchaseRequest};
//! use photo_core::PaymentProvider;
//!
//! let orchestrator = PaymentOrchestrator::builder(api, intents, polls)
//!     .invoices(chat_invoices)
//!     .build();
//!
//! orchestrator.begin(PurchaseRequest {
//!     provider: PaymentProvider::ChatInvoice,
//!     tier_id: "standard".into(),
//!     buyer_id: buyer,
//!     avatar_id: Some(avatar),
//! }).await?;
//!
//! let mut outcomes = orchestrator.outcomes();
//! let outcome = outcomes.recv().await?;
//! ```

mod error;
pub mod handoff;
mod intent;
mod orchestrator;
mod tier;

pub use error::{PaymentError, Result};
pub use handoff::{
    InvoiceStatus, InvoiceSurface, Navigator, TransactionRef, TransferRequest, WalletConnector,
    WalletSession,
};
pub use intent::{IntentStatus, PaymentIntent, PurchaseRequest, TerminalGuard};
pub use orchestrator::{
    AttemptId, CHAT_INVOICE_POLL_KEY, FailureKind, PaymentFailure, PaymentOrchestrator,
    PaymentOrchestratorBuilder, PaymentOutcome, PaymentState, PaymentTimings,
};
pub use tier::{Price, Tier, catalog, find_tier};
