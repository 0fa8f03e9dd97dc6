//! # Order Cache Server
//!
//! Wires the order cache together: Postgres durable store, Redpanda event
//! source, ingest pipeline, read cache and HTTP lookups.
//!
//! - [`config`]: environment-driven configuration
//! - [`app`]: ordered startup and graceful shutdown
//! - [`sample`]: the reference order sent by the `publish` binary

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod sample;

pub use app::Application;
pub use config::{Config, RejectMode};
