//! Durable key-value store for a daemon's local state.
//!
//! Other processes query and mutate the store over a request-response
//! socket; this crate alone decides when the state reaches the disk. Each
//! module focuses on one responsibility:
//!
//! - [`store`] holds the in-memory map and its [`store::Snapshot`] form.
//! - [`persistence`] loads snapshots and replaces them atomically on disk.
//! - [`backoff`] and [`scheduler`] decide when a save happens: immediately
//!   (synchronous mode) or debounced behind a single timer with exponential
//!   backoff on failure.
//! - [`processor`] turns one request frame into one response frame.
//! - [`service`] is the single-threaded reactor that owns all of the above
//!   and performs the final save on shutdown.
//! - [`server`] and [`client`] speak the newline-delimited JSON protocol in
//!   [`protocol`] over TCP.
//! - [`cli`] and [`config`] describe how the binary is configured.
//!
//! Tests drive the reactor directly through [`service::ServiceHandle`], so
//! the persistence policy can be exercised without a socket.

pub mod backoff;
pub mod cli;
pub mod client;
pub mod config;
pub mod persistence;
pub mod processor;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod store;
