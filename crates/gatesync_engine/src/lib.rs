//! # gatesync engine
//!
//! Talks to a gateway's admin API and applies change lists to it.
//!
//! This crate provides:
//! - The [`AdminClient`] contract and an HTTP implementation over an
//!   abstract [`HttpClient`]
//! - [`MemoryGateway`], a thread-safe in-memory admin API with fault
//!   injection
//! - [`fetch_state`] for reading the current state into an aggregate
//! - [`SyncExecutor`], a bounded worker pool that applies a change list in
//!   dependency order with ID back-fill, retry and cancellation
//!
//! ## Key Invariants
//!
//! - No event is dispatched before the events it depends on have been applied
//! - Foreign keys in outgoing records always carry concrete remote IDs
//! - A failed event skips its dependents; independent events still run
//! - Cancellation never rolls back applied events

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod executor;
mod fetch;
mod http;
mod memory;
mod registry;

pub use client::AdminClient;
pub use config::{RetryConfig, SyncConfig};
pub use error::{AdminError, AdminResult, ChangeError, SyncError, SyncResult};
pub use executor::{CancelHandle, EventReport, Outcome, SyncExecutor, SyncReport, SyncStats};
pub use fetch::{fetch_raw, fetch_state};
pub use http::{HttpAdminClient, HttpClient, HttpResponse, Method};
pub use memory::{FaultBuilder, GatewayCall, MemoryGateway};
pub use registry::IdRegistry;
