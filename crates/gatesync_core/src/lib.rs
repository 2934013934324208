//! # gatesync core
//!
//! In-memory gateway state model and diff engine.
//!
//! This crate provides:
//! - Typed records for the eleven gateway entity kinds
//! - Identity resolution (server ID, else natural key)
//! - Indexed per-kind collections with reference counting
//! - The state aggregate, built kind by kind in dependency order
//! - The kind-level dependency graph
//! - The diff engine producing an ordered change list
//!
//! ## Key Invariants
//!
//! - Every stored record has exactly one identity, fixed at insert
//! - Every foreign key resolves within the same aggregate
//! - IDs and natural keys are unique per kind
//! - `diff(s, s)` is empty for any valid aggregate `s`
//! - Creates run parents first, deletes run children first

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
pub mod diff;
pub mod entity;
mod error;
pub mod graph;
pub mod identity;
pub mod state;
mod types;

pub use collection::{Collection, Link, Stored};
pub use diff::{diff, Change, ChangeList, FieldDelta, Operation};
pub use entity::{
    BasicAuth, Certificate, Consumer, Entity, EntityRecord, HmacAuth, JwtAuth, KeyAuth, Plugin,
    Route, Service, Target, Upstream,
};
pub use error::{DiffError, DiffResult, ErrorSet, GraphError, GraphResult, StateError, StateResult};
pub use graph::{DependencyGraph, STANDARD_EDGES};
pub use identity::{Identity, NaturalKey};
pub use state::{RawState, StateAggregate};
pub use types::{EntityKind, ForeignKey, Relation};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
