//! Client for the upstream async-task API (Novita-style).
//!
//! Provides the REST client used to submit generation jobs and query their
//! status, the typed response and webhook envelope shapes, and the
//! [`TaskSource`] seam the relay depends on. Both the status query and the
//! webhook decoder produce the same [`relay_core::task::TaskSnapshot`].

pub mod api;
pub mod error;
pub mod messages;
pub mod source;
pub mod webhook;

pub use api::NovitaApi;
pub use error::UpstreamError;
pub use source::TaskSource;
