//! # photo-runtime
//!
//! Concrete collaborators for running the orchestration outside tests:
//!
//! - [`HttpStudioApi`]: `StudioApi` over the studio server's JSON endpoints
//! - [`FileDurableStore`]: `DurableStore` kept in a JSON file, so the pending
//!   purchase intent and client preferences survive a restart

pub mod file_store;
pub mod http;

pub use file_store::FileDurableStore;
pub use http::HttpStudioApi;
