//! Error types for gatesync core.

use crate::identity::Identity;
use crate::types::{EntityKind, Relation};
use std::fmt;
use thiserror::Error;

/// Result type for state construction and mutation.
pub type StateResult<T> = Result<T, StateError>;

/// Result type for dependency graph construction.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type for diff computation.
pub type DiffResult<T> = Result<T, DiffError>;

/// Errors raised while building or mutating a state aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Two entities of one kind share an ID.
    #[error("duplicate {kind} id: {id}")]
    DuplicateId {
        /// Entity kind.
        kind: EntityKind,
        /// The colliding ID.
        id: String,
    },

    /// Two entities of one kind share a natural key within the same scope.
    #[error("duplicate {kind} name: {key}")]
    DuplicateName {
        /// Entity kind.
        kind: EntityKind,
        /// The colliding natural key or name.
        key: String,
    },

    /// A foreign key does not resolve to an entity in the aggregate.
    #[error("{kind} {entity}: {relation} reference '{reference}' does not exist")]
    DanglingReference {
        /// Kind of the referencing entity.
        kind: EntityKind,
        /// Label of the referencing entity.
        entity: String,
        /// The offending relation.
        relation: Relation,
        /// The unresolved reference.
        reference: String,
    },

    /// An entity has neither an ID nor its natural-key fields.
    #[error("{kind} {entity}: no id and no natural key to identify it")]
    AmbiguousIdentity {
        /// Entity kind.
        kind: EntityKind,
        /// Label of the entity.
        entity: String,
    },

    /// Deleting an entity that other entities still reference.
    #[error("{identity} is still referenced by {referrers} entities")]
    ReferencedEntity {
        /// The entity that was to be deleted.
        identity: Identity,
        /// Number of remaining references.
        referrers: usize,
    },

    /// Entity not present in the collection.
    #[error("{identity} not found")]
    NotFound {
        /// The missing identity.
        identity: Identity,
    },

    /// A stored link points at a parent that is no longer present.
    #[error("{identity}: {relation} link to {parent} is broken")]
    BrokenLink {
        /// The child entity.
        identity: Identity,
        /// Relation of the broken link.
        relation: Relation,
        /// The missing parent.
        parent: Identity,
    },

    /// Stored reference count disagrees with the actual number of children.
    #[error("{identity}: recorded {recorded} referrers, found {actual}")]
    ReferenceCountMismatch {
        /// The parent entity.
        identity: Identity,
        /// Count held by the collection.
        recorded: usize,
        /// Count found by walking the children.
        actual: usize,
    },
}

/// Errors raised while constructing a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The edges contain a cycle; the listed kinds could not be ordered.
    #[error("invalid dependency graph: cycle among {}", join_kinds(.remaining))]
    Cycle {
        /// Kinds left unordered by the topological sort.
        remaining: Vec<EntityKind>,
    },
}

fn join_kinds(kinds: &[EntityKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the diff engine.
///
/// These indicate schema or programming errors and fail the whole diff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// A record could not be turned into a comparable field map.
    #[error("{kind} {entity}: cannot serialize record: {message}")]
    Serialization {
        /// Entity kind.
        kind: EntityKind,
        /// Label of the entity.
        entity: String,
        /// Serializer message.
        message: String,
    },

    /// The same field holds values of different types on each side.
    #[error("{kind} {entity}: field '{field}' is {current} in current state but {desired} in desired state")]
    Incomparable {
        /// Entity kind.
        kind: EntityKind,
        /// Label of the entity.
        entity: String,
        /// The field name.
        field: String,
        /// JSON type on the current side.
        current: &'static str,
        /// JSON type on the desired side.
        desired: &'static str,
    },

    /// Two desired entities resolved to the same current entity.
    #[error("{current} is matched by both {first} and {second}")]
    AmbiguousMatch {
        /// The current-side entity.
        current: Identity,
        /// First desired entity that matched.
        first: Identity,
        /// Second desired entity that matched.
        second: Identity,
    },
}

/// A collection of independent errors reported together.
///
/// Order is the order in which errors were pushed; producers push in a
/// deterministic order so two runs over the same input report identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSet<E> {
    errors: Vec<E>,
}

impl<E> ErrorSet<E> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Adds an error.
    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    /// Returns true if no errors were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    /// Returns the errors as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.errors
    }

    /// Consumes the set into its errors.
    #[must_use]
    pub fn into_vec(self) -> Vec<E> {
        self.errors
    }

    /// Returns `Ok(value)` when empty, otherwise the set itself as the error.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl<E> Default for ErrorSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FromIterator<E> for ErrorSet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<E> IntoIterator for ErrorSet<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a ErrorSet<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl<E: fmt::Display> fmt::Display for ErrorSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => f.write_str("no errors"),
            1 => write!(f, "1 error occurred:\n\t{}", self.errors[0]),
            n => {
                write!(f, "{n} errors occurred:")?;
                for error in &self.errors {
                    write!(f, "\n\t{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ErrorSet<E> {}
