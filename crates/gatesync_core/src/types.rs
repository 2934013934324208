//! Core type definitions for gatesync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a gateway configuration entity.
///
/// Declaration order is the tie-break order used when computing the
/// dependency graph's topological order, so it is part of the output
/// contract of the diff engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An upstream service definition.
    Service,
    /// A route into a service.
    Route,
    /// A load-balancing upstream.
    Upstream,
    /// A target address of an upstream.
    Target,
    /// A TLS certificate.
    Certificate,
    /// A plugin instance.
    Plugin,
    /// An API consumer.
    Consumer,
    /// A key-auth credential.
    KeyAuth,
    /// An HMAC-auth credential.
    HmacAuth,
    /// A JWT credential.
    JwtAuth,
    /// A basic-auth credential.
    BasicAuth,
}

impl EntityKind {
    /// Every entity kind, in declaration order.
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Service,
        EntityKind::Route,
        EntityKind::Upstream,
        EntityKind::Target,
        EntityKind::Certificate,
        EntityKind::Plugin,
        EntityKind::Consumer,
        EntityKind::KeyAuth,
        EntityKind::HmacAuth,
        EntityKind::JwtAuth,
        EntityKind::BasicAuth,
    ];

    /// Returns the snake_case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Route => "route",
            EntityKind::Upstream => "upstream",
            EntityKind::Target => "target",
            EntityKind::Certificate => "certificate",
            EntityKind::Plugin => "plugin",
            EntityKind::Consumer => "consumer",
            EntityKind::KeyAuth => "key_auth",
            EntityKind::HmacAuth => "hmac_auth",
            EntityKind::JwtAuth => "jwt_auth",
            EntityKind::BasicAuth => "basic_auth",
        }
    }

    /// Returns true for the four consumer credential kinds.
    #[must_use]
    pub const fn is_credential(self) -> bool {
        matches!(
            self,
            EntityKind::KeyAuth | EntityKind::HmacAuth | EntityKind::JwtAuth | EntityKind::BasicAuth
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign-key relation from a child record to its parent.
///
/// Each relation names both the parent kind and the record field that
/// holds the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Reference to a service.
    Service,
    /// Reference to a route.
    Route,
    /// Reference to an upstream.
    Upstream,
    /// Reference to a consumer.
    Consumer,
}

impl Relation {
    /// Every relation, in declaration order.
    pub const ALL: [Relation; 4] = [
        Relation::Service,
        Relation::Route,
        Relation::Upstream,
        Relation::Consumer,
    ];

    /// Returns the kind of the referenced parent.
    #[must_use]
    pub const fn parent_kind(self) -> EntityKind {
        match self {
            Relation::Service => EntityKind::Service,
            Relation::Route => EntityKind::Route,
            Relation::Upstream => EntityKind::Upstream,
            Relation::Consumer => EntityKind::Consumer,
        }
    }

    /// Returns the record field holding the reference.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Relation::Service => "service",
            Relation::Route => "route",
            Relation::Upstream => "upstream",
            Relation::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// A declared foreign key on a record.
///
/// `reference` is either the parent's ID or the parent's name, exactly as
/// the record carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Which parent this key points at.
    pub relation: Relation,
    /// Parent ID or name.
    pub reference: String,
}

impl ForeignKey {
    /// Creates a foreign key.
    pub fn new(relation: Relation, reference: impl Into<String>) -> Self {
        Self {
            relation,
            reference: reference.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ordering_follows_declaration() {
        assert!(EntityKind::Service < EntityKind::Route);
        assert!(EntityKind::Consumer < EntityKind::BasicAuth);
        let mut sorted = EntityKind::ALL;
        sorted.sort();
        assert_eq!(sorted, EntityKind::ALL);
    }

    #[test]
    fn kind_display() {
        assert_eq!(EntityKind::HmacAuth.to_string(), "hmac_auth");
        assert_eq!(format!("{}", EntityKind::Route), "route");
    }

    #[test]
    fn relation_parent_kind() {
        assert_eq!(Relation::Upstream.parent_kind(), EntityKind::Upstream);
        assert_eq!(Relation::Consumer.field(), "consumer");
        assert!(EntityKind::JwtAuth.is_credential());
        assert!(!EntityKind::Plugin.is_credential());
    }
}
