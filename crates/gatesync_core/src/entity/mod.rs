//! Gateway entity records.
//!
//! Each entity kind has a plain serde record type. The [`Entity`] trait is
//! the small capability surface the collection, aggregate and diff engine
//! need from a record: its ID, the fields forming its natural key and its
//! foreign keys.

mod record;
mod records;

pub use record::EntityRecord;
pub use records::{
    BasicAuth, Certificate, Consumer, HmacAuth, JwtAuth, KeyAuth, Plugin, Route, Service, Target,
    Upstream,
};

use crate::collection::Collection;
use crate::state::StateAggregate;
use crate::types::{EntityKind, ForeignKey, Relation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Capabilities shared by every entity record.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind of this record.
    const KIND: EntityKind;

    /// Relations this kind may declare, in key order.
    const RELATIONS: &'static [Relation] = &[];

    /// Whether parent keys are part of this kind's natural key. Globally
    /// named kinds keep their key when re-parented.
    const SCOPED_KEY: bool = true;

    /// Array fields whose order carries no meaning.
    const UNORDERED_FIELDS: &'static [&'static str] = &["tags"];

    /// Returns the ID, if the record carries one.
    fn id(&self) -> Option<&str>;

    /// Sets the ID.
    fn set_id(&mut self, id: String);

    /// Returns the name other records may use to reference this one.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Returns a second reference name, unique in its own namespace.
    fn alias(&self) -> Option<&str> {
        None
    }

    /// Returns the record's own natural-key fields, parents excluded.
    ///
    /// `None` when a required field is absent.
    fn key_fields(&self) -> Option<Vec<String>>;

    /// Returns the declared foreign keys.
    fn foreign_keys(&self) -> Vec<ForeignKey> {
        Vec::new()
    }

    /// Replaces the reference held for `relation`.
    fn set_foreign_key(&mut self, _relation: Relation, _reference: String) {}

    /// Fills server-side defaults so an omitted field compares equal to
    /// its default value.
    fn apply_defaults(&mut self) {}

    /// Returns this kind's collection within an aggregate.
    fn collection(state: &StateAggregate) -> &Collection<Self>;

    /// Returns this kind's collection within an aggregate, mutably.
    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self>;

    /// Wraps the record into the kind-tagged enum.
    fn into_record(self) -> EntityRecord;

    /// Unwraps the kind-tagged enum, if it holds this kind.
    fn from_record(record: EntityRecord) -> Option<Self>;

    /// Short human-readable handle for logs and errors.
    fn label(&self) -> String {
        if let Some(name) = self.name().or_else(|| self.alias()) {
            return name.to_owned();
        }
        if let Some(fields) = self.key_fields() {
            return fields.join("/");
        }
        self.id().unwrap_or("<unnamed>").to_owned()
    }
}
