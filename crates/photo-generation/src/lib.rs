//! # photo-generation
//!
//! Turns a confirmed purchase into generated photos, including after the
//! process was restarted mid-flow.
//!
//! ## Resume after an external hand-off
//!
//! ```text
//! ┌──────────────┐   ?resume=1   ┌──────────────────────────────┐
//! │ Hosted page  │──────────────▶│ GenerationResumeCoordinator  │
//! │ / wallet app │               │  intent + server avatars     │
//! └──────────────┘               └──────────────┬───────────────┘
//!                                               │ job id
//!                                               ▼
//!                                ┌──────────────────────────────┐
//!                                │ GenerationTracker            │
//!                                │  3s poll, 15min deadline     │
//!                                │  append-only asset list      │
//!                                └──────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use photo_generation::{GenerationResumeCoordinator, ResumeOutcome};
//!
//! let coordinator = GenerationResumeCoordinator::new(api, intents, polls)
//!     .with_config(&config);
//!
//! let report = coordinator.run(&launch_url, session_buyer.as_ref()).await?;
//! host.replace_location(&report.cleaned_url);
//!
//! if let ResumeOutcome::Tracking(tracker) = report.outcome {
//!     let job = tracker.wait().await.into_result()?;
//! }
//! ```

pub mod error;
pub mod launch;
pub mod resume;
pub mod retry;
pub mod tracker;

pub use error::{GenerationError, Result};
pub use launch::LaunchContext;
pub use resume::{GenerationResumeCoordinator, ResumeOutcome, ResumeReport, select_target};
pub use retry::{RetryPolicy, create_job_with_retry};
pub use tracker::{GenerationOutcome, GenerationSnapshot, GenerationTracker, TrackerTimings};
