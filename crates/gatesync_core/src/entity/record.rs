//! Kind-tagged record enum.

use super::records::{
    BasicAuth, Certificate, Consumer, HmacAuth, JwtAuth, KeyAuth, Plugin, Route, Service, Target,
    Upstream,
};
use super::Entity;
use crate::types::{EntityKind, ForeignKey, Relation};
use serde::{Deserialize, Serialize};

/// A record of any entity kind.
///
/// Change events and the admin client pass records of mixed kinds; this
/// enum carries them without boxing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    /// A service.
    Service(Service),
    /// A route.
    Route(Route),
    /// An upstream.
    Upstream(Upstream),
    /// A target.
    Target(Target),
    /// A certificate.
    Certificate(Certificate),
    /// A plugin.
    Plugin(Plugin),
    /// A consumer.
    Consumer(Consumer),
    /// A key-auth credential.
    KeyAuth(KeyAuth),
    /// An HMAC-auth credential.
    HmacAuth(HmacAuth),
    /// A JWT credential.
    JwtAuth(JwtAuth),
    /// A basic-auth credential.
    BasicAuth(BasicAuth),
}

macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            EntityRecord::Service($inner) => $body,
            EntityRecord::Route($inner) => $body,
            EntityRecord::Upstream($inner) => $body,
            EntityRecord::Target($inner) => $body,
            EntityRecord::Certificate($inner) => $body,
            EntityRecord::Plugin($inner) => $body,
            EntityRecord::Consumer($inner) => $body,
            EntityRecord::KeyAuth($inner) => $body,
            EntityRecord::HmacAuth($inner) => $body,
            EntityRecord::JwtAuth($inner) => $body,
            EntityRecord::BasicAuth($inner) => $body,
        }
    };
}

impl EntityRecord {
    /// Returns the kind of the wrapped record.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Service(_) => EntityKind::Service,
            EntityRecord::Route(_) => EntityKind::Route,
            EntityRecord::Upstream(_) => EntityKind::Upstream,
            EntityRecord::Target(_) => EntityKind::Target,
            EntityRecord::Certificate(_) => EntityKind::Certificate,
            EntityRecord::Plugin(_) => EntityKind::Plugin,
            EntityRecord::Consumer(_) => EntityKind::Consumer,
            EntityRecord::KeyAuth(_) => EntityKind::KeyAuth,
            EntityRecord::HmacAuth(_) => EntityKind::HmacAuth,
            EntityRecord::JwtAuth(_) => EntityKind::JwtAuth,
            EntityRecord::BasicAuth(_) => EntityKind::BasicAuth,
        }
    }

    /// Returns the record's ID.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        each_record!(self, inner => inner.id())
    }

    /// Sets the record's ID.
    pub fn set_id(&mut self, id: String) {
        each_record!(self, inner => inner.set_id(id))
    }

    /// Relations this record's kind may declare.
    #[must_use]
    pub fn relations(&self) -> &'static [Relation] {
        fn relations_of<T: Entity>(_: &T) -> &'static [Relation] {
            T::RELATIONS
        }
        each_record!(self, inner => relations_of(inner))
    }

    /// Returns the declared foreign keys.
    #[must_use]
    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        each_record!(self, inner => inner.foreign_keys())
    }

    /// Replaces the reference held for `relation`.
    pub fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        each_record!(self, inner => inner.set_foreign_key(relation, reference))
    }

    /// Name other records may use to reference this one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        each_record!(self, inner => inner.name())
    }

    /// Second reference name, if the kind has one.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        each_record!(self, inner => inner.alias())
    }

    /// The record's own natural-key fields.
    #[must_use]
    pub fn key_fields(&self) -> Option<Vec<String>> {
        each_record!(self, inner => inner.key_fields())
    }

    /// Fills server-side defaults.
    pub fn apply_defaults(&mut self) {
        each_record!(self, inner => inner.apply_defaults())
    }

    /// Short human-readable handle.
    #[must_use]
    pub fn label(&self) -> String {
        each_record!(self, inner => inner.label())
    }

    /// Serializes the wrapped record without the kind tag.
    pub fn to_fields(&self) -> serde_json::Result<serde_json::Value> {
        each_record!(self, inner => serde_json::to_value(inner))
    }

    /// Deserializes an untagged record of `kind`.
    pub fn from_fields(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Service => serde_json::from_value::<Service>(value)?.into_record(),
            EntityKind::Route => serde_json::from_value::<Route>(value)?.into_record(),
            EntityKind::Upstream => serde_json::from_value::<Upstream>(value)?.into_record(),
            EntityKind::Target => serde_json::from_value::<Target>(value)?.into_record(),
            EntityKind::Certificate => serde_json::from_value::<Certificate>(value)?.into_record(),
            EntityKind::Plugin => serde_json::from_value::<Plugin>(value)?.into_record(),
            EntityKind::Consumer => serde_json::from_value::<Consumer>(value)?.into_record(),
            EntityKind::KeyAuth => serde_json::from_value::<KeyAuth>(value)?.into_record(),
            EntityKind::HmacAuth => serde_json::from_value::<HmacAuth>(value)?.into_record(),
            EntityKind::JwtAuth => serde_json::from_value::<JwtAuth>(value)?.into_record(),
            EntityKind::BasicAuth => serde_json::from_value::<BasicAuth>(value)?.into_record(),
        })
    }
}
