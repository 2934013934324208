//! Identity resolution.
//!
//! Two snapshots of the same gateway are built independently: the current
//! one by listing the admin API (every record carries a server-assigned ID)
//! and the desired one from a declarative file (records usually carry no
//! ID). Identities let the diff engine pair up records across the two.
//!
//! Resolution rules:
//! - a record carrying an ID is identified by that ID;
//! - otherwise it is identified by its natural key, the tuple of its kind,
//!   its parents' natural keys and its own key fields;
//! - a record with neither cannot be identified.
//!
//! Every stored record keeps its natural key alongside its identity, so an
//! ID-less desired record can still be found in a current snapshot whose
//! records are all identified by ID.

use crate::error::{StateError, StateResult};
use crate::types::{EntityKind, Relation};
use std::fmt;

/// A deterministic tuple naming a record by its attributes.
///
/// Components are escaped and joined with `/`, so the key is stable
/// across processes and readable in error messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey(String);

impl NaturalKey {
    /// Builds a key from parent components and the record's own fields.
    ///
    /// Parent components are tagged with their relation so a plugin on
    /// service `a` and a plugin on route `a` get different keys.
    pub fn compose<S: AsRef<str>>(parents: &[(Relation, String)], fields: &[S]) -> Self {
        let mut parts = Vec::with_capacity(parents.len() + fields.len());
        for (relation, component) in parents {
            parts.push(format!("{}={}", relation.field(), escape(component)));
        }
        for field in fields {
            parts.push(escape(field.as_ref()));
        }
        Self(parts.join("/"))
    }

    /// Returns the key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(component: &str) -> String {
    if component.contains(['\\', '/', '=']) {
        component
            .replace('\\', "\\\\")
            .replace('/', "\\/")
            .replace('=', "\\=")
    } else {
        component.to_owned()
    }
}

/// The stable key used to match a record across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    /// Identified by a server-assigned (or user-pinned) ID.
    Id {
        /// Entity kind.
        kind: EntityKind,
        /// The ID.
        id: String,
    },
    /// Identified by natural key.
    Key {
        /// Entity kind.
        kind: EntityKind,
        /// The natural key.
        key: NaturalKey,
    },
}

impl Identity {
    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Identity::Id { kind, .. } | Identity::Key { kind, .. } => *kind,
        }
    }

    /// Returns the ID if this identity is ID-based.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Identity::Id { id, .. } => Some(id),
            Identity::Key { .. } => None,
        }
    }

    /// Returns the natural key if this identity is key-based.
    #[must_use]
    pub fn natural_key(&self) -> Option<&NaturalKey> {
        match self {
            Identity::Key { key, .. } => Some(key),
            Identity::Id { .. } => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id { kind, id } => write!(f, "{kind} id:{id}"),
            Identity::Key { kind, key } => write!(f, "{kind} {key}"),
        }
    }
}

/// Resolves the identity of a record.
///
/// `label` only feeds the error message.
pub fn resolve(
    kind: EntityKind,
    id: Option<&str>,
    key: Option<&NaturalKey>,
    label: &str,
) -> StateResult<Identity> {
    match (id, key) {
        (Some(id), _) if !id.is_empty() => Ok(Identity::Id {
            kind,
            id: id.to_owned(),
        }),
        (_, Some(key)) => Ok(Identity::Key {
            kind,
            key: key.clone(),
        }),
        _ => Err(StateError::AmbiguousIdentity {
            kind,
            entity: label.to_owned(),
        }),
    }
}

/// Component a parent contributes to its children's natural keys.
///
/// Uses the parent's natural key when it has one, else its ID.
pub fn parent_component(key: Option<&NaturalKey>, id: Option<&str>) -> Option<String> {
    key.map(|k| k.as_str().to_owned())
        .or_else(|| id.map(|id| format!("id:{id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_wins_over_key() {
        let key = NaturalKey::compose::<&str>(&[], &["svc1"]);
        let identity = resolve(EntityKind::Service, Some("abc"), Some(&key), "svc1").unwrap();
        assert_eq!(identity.id(), Some("abc"));
        assert_eq!(identity.kind(), EntityKind::Service);
    }

    #[test]
    fn key_used_without_id() {
        let key = NaturalKey::compose::<&str>(&[], &["svc1"]);
        let identity = resolve(EntityKind::Service, None, Some(&key), "svc1").unwrap();
        assert_eq!(identity.natural_key(), Some(&key));
        assert_eq!(identity.to_string(), "service svc1");
    }

    #[test]
    fn empty_id_is_ignored() {
        let key = NaturalKey::compose::<&str>(&[], &["svc1"]);
        let identity = resolve(EntityKind::Service, Some(""), Some(&key), "svc1").unwrap();
        assert!(identity.natural_key().is_some());
    }

    #[test]
    fn neither_is_ambiguous() {
        let err = resolve(EntityKind::Route, None, None, "<unnamed>").unwrap_err();
        assert!(matches!(err, StateError::AmbiguousIdentity { kind: EntityKind::Route, .. }));
    }

    #[test]
    fn composite_key_is_scoped_by_parent() {
        let a = NaturalKey::compose(&[(Relation::Upstream, "up1".into())], &["10.0.0.1:80"]);
        let b = NaturalKey::compose(&[(Relation::Upstream, "up2".into())], &["10.0.0.1:80"]);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "upstream=up1/10.0.0.1:80");
    }

    #[test]
    fn components_are_escaped() {
        let a = NaturalKey::compose::<&str>(&[], &["a/b", "c"]);
        let b = NaturalKey::compose::<&str>(&[], &["a", "b/c"]);
        assert_ne!(a, b);
    }

    #[test]
    fn parent_component_prefers_key() {
        let key = NaturalKey::compose::<&str>(&[], &["svc"]);
        assert_eq!(parent_component(Some(&key), Some("1")), Some("svc".into()));
        assert_eq!(parent_component(None, Some("1")), Some("id:1".into()));
        assert_eq!(parent_component(None, None), None);
    }
}
