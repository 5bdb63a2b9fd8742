//! Request handlers.
//!
//! Handlers are thin: they decode the request, delegate to the registry, the
//! upstream client, or the stream relay, and map failures via [`AppError`].
//!
//! [`AppError`]: crate::error::AppError

pub mod stream;
pub mod tasks;
pub mod webhook;
