//! Sync engine core of the cirrus daemon.
//!
//! Translates local filesystem changes into an idempotent, retryable job
//! stream and executes it against a content-addressed cloud backend through
//! the narrow [`cirrus_remote::RemoteClient`] capability surface.

pub mod config;
pub mod daemon;
pub mod sync;
