//! # photo-core
//!
//! Building blocks for resumable payment and generation flows in the photo
//! studio mini-app.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         photo-core                           │
//! │  ┌───────────────────┐  ┌──────────────────┐  ┌───────────┐  │
//! │  │ PollingController │  │ PersistentIntent │  │ StudioApi │  │
//! │  │  key ─▶ handle    │  │ Store (durable)  │  │ (Strategy)│  │
//! │  └───────────────────┘  └──────────────────┘  └───────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!          ▲                        ▲                   ▲
//!   photo-payments           photo-generation     photo-runtime
//! ```
//!
//! Nothing here reads ambient globals: clocks, storage and the server are
//! injected so every state machine can be driven from a test.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod polling;
pub mod preferences;
pub mod store;

pub use api::{
    CreateJobRequest, CreatePaymentRequest, CreatedJob, CreatedPayment, JobStatus,
    PaymentStatus, PaymentStatusKind, StudioApi,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use model::{
    Asset, AssetId, Avatar, AvatarId, AvatarStatus, BuyerId, GenerationJob, GenerationStatus,
    JobId, JobProgress, PaymentId, PaymentProvider, TierId,
};
pub use polling::{PollOptions, PollTimeout, PollingController, ProbeOutcome, TimeoutReason};
pub use preferences::{ClientPreferences, Theme};
pub use store::{DurableStore, MemoryDurableStore, PersistedIntentRecord, PersistentIntentStore};
