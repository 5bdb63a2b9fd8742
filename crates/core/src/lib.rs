//! Domain types shared by every relay crate.
//!
//! - [`status`] — the internal task status enum and the upstream status mapper.
//! - [`task`] — [`Task`](task::Task) records and the normalized
//!   [`TaskSnapshot`](task::TaskSnapshot) produced by both decoders.
//! - [`failure`] — client-safe failure taxonomy for the stream relay.
//! - [`stream_event`] — JSON payloads framed onto the client event stream.

pub mod error;
pub mod failure;
pub mod status;
pub mod stream_event;
pub mod task;
pub mod types;
