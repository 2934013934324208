//! Admin API client abstraction.

use crate::error::AdminResult;
use gatesync_core::{EntityKind, EntityRecord};
use std::sync::Arc;

/// The narrow admin API contract the executor and fetcher depend on.
///
/// Records cross this boundary in their flat form: foreign keys are plain
/// strings holding the parent's ID. Implementations must be safe to call
/// from several worker threads at once.
pub trait AdminClient: Send + Sync {
    /// Lists every record of `kind`, all pages included.
    fn list(&self, kind: EntityKind) -> AdminResult<Vec<EntityRecord>>;

    /// Creates a record and returns it with its server-assigned ID.
    fn create(&self, record: &EntityRecord) -> AdminResult<EntityRecord>;

    /// Replaces the fields of record `id` and returns the stored result.
    fn update(&self, id: &str, record: &EntityRecord) -> AdminResult<EntityRecord>;

    /// Deletes a record. `record` carries the ID and, for nested
    /// endpoints, the parent reference.
    fn delete(&self, record: &EntityRecord) -> AdminResult<()>;
}

impl<C: AdminClient + ?Sized> AdminClient for Arc<C> {
    fn list(&self, kind: EntityKind) -> AdminResult<Vec<EntityRecord>> {
        (**self).list(kind)
    }

    fn create(&self, record: &EntityRecord) -> AdminResult<EntityRecord> {
        (**self).create(record)
    }

    fn update(&self, id: &str, record: &EntityRecord) -> AdminResult<EntityRecord> {
        (**self).update(id, record)
    }

    fn delete(&self, record: &EntityRecord) -> AdminResult<()> {
        (**self).delete(record)
    }
}

impl<C: AdminClient + ?Sized> AdminClient for &C {
    fn list(&self, kind: EntityKind) -> AdminResult<Vec<EntityRecord>> {
        (**self).list(kind)
    }

    fn create(&self, record: &EntityRecord) -> AdminResult<EntityRecord> {
        (**self).create(record)
    }

    fn update(&self, id: &str, record: &EntityRecord) -> AdminResult<EntityRecord> {
        (**self).update(id, record)
    }

    fn delete(&self, record: &EntityRecord) -> AdminResult<()> {
        (**self).delete(record)
    }
}
