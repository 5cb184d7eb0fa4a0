//! simpleperf - a minimal TCP throughput prober
//!
//! A server accepts TCP connections and measures the inbound byte rate of
//! each one. A client opens one or more connections to a server and pushes
//! a generated byte stream for a fixed duration or a fixed total size,
//! reporting throughput per interval and per connection.
//!
//! # Features
//!
//! - Duration-based or size-based transfers
//! - Interval reporting over equal time windows
//! - Parallel client connections
//! - Text or JSON report lines in B, KB or MB
//! - Asynchronous I/O using tokio, one task per connection

pub mod protocol;
pub mod server;
pub mod client;
pub mod config;
pub mod measurements;
pub mod interval_reporter;
pub mod error;

pub use error::{Error, Result};
pub use config::{ByteSize, Config, Mode, TransferLimit, Unit};
pub use measurements::{RateSample, TransferWindow};
pub use client::Client;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
