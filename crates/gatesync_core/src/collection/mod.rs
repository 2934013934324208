//! Indexed per-kind entity storage.
//!
//! `Collection<T>` stores the records of one kind in insertion order and
//! keeps hash indexes by identity, ID, natural key, name and parent.
//! Referential checks that span kinds live in the aggregate; the
//! collection only knows how many children reference each of its records.

mod index;

pub use index::MultiIndex;

use crate::entity::Entity;
use crate::error::{StateError, StateResult};
use crate::identity::{self, Identity, NaturalKey};
use crate::types::{EntityKind, Relation};
use std::collections::HashMap;

/// A resolved foreign key: the relation and the parent's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    /// Which relation this link fills.
    pub relation: Relation,
    /// Identity of the parent within the same aggregate.
    pub parent: Identity,
}

impl Link {
    /// Creates a link.
    #[must_use]
    pub fn new(relation: Relation, parent: Identity) -> Self {
        Self { relation, parent }
    }
}

/// A record together with its resolved identity, key and links.
#[derive(Debug, Clone)]
pub struct Stored<T> {
    entity: T,
    identity: Identity,
    key: Option<NaturalKey>,
    links: Vec<Link>,
}

impl<T: Entity> Stored<T> {
    /// Bundles a record with its resolved metadata.
    pub fn new(entity: T, identity: Identity, key: Option<NaturalKey>, links: Vec<Link>) -> Self {
        Self {
            entity,
            identity,
            key,
            links,
        }
    }

    /// The record.
    pub fn entity(&self) -> &T {
        &self.entity
    }

    /// The identity, fixed at insert.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The natural key, if the record has one.
    pub fn natural_key(&self) -> Option<&NaturalKey> {
        self.key.as_ref()
    }

    /// Resolved foreign keys.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The link filling `relation`, if any.
    pub fn link(&self, relation: Relation) -> Option<&Link> {
        self.links.iter().find(|link| link.relation == relation)
    }

    fn key_component(&self) -> String {
        identity::parent_component(self.key.as_ref(), self.entity.id())
            .unwrap_or_else(|| self.identity.to_string())
    }
}

/// What a child needs from a resolved parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentRef {
    pub identity: Identity,
    pub component: String,
}

/// Indexed container for the records of one kind.
#[derive(Debug, Clone)]
pub struct Collection<T: Entity> {
    /// Records in insertion order; deleted slots are `None`.
    slots: Vec<Option<Stored<T>>>,
    by_identity: HashMap<Identity, usize>,
    by_id: HashMap<String, usize>,
    by_key: HashMap<NaturalKey, usize>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
    by_parent: MultiIndex<Identity>,
    /// Inbound reference counts, maintained by the aggregate.
    referrers: HashMap<Identity, usize>,
    live: usize,
}

impl<T: Entity> Collection<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_identity: HashMap::new(),
            by_id: HashMap::new(),
            by_key: HashMap::new(),
            by_name: HashMap::new(),
            by_alias: HashMap::new(),
            by_parent: MultiIndex::new(),
            referrers: HashMap::new(),
            live: 0,
        }
    }

    /// Inserts a resolved record.
    ///
    /// Fails with `DuplicateId` or `DuplicateName` on collision; on failure
    /// the collection is unchanged.
    pub fn insert(&mut self, stored: Stored<T>) -> StateResult<&Stored<T>> {
        let id = stored.entity.id().filter(|id| !id.is_empty());
        if let Some(id) = id {
            if self.by_id.contains_key(id) {
                return Err(StateError::DuplicateId {
                    kind: T::KIND,
                    id: id.to_owned(),
                });
            }
        }
        if let Some(key) = &stored.key {
            if self.by_key.contains_key(key) {
                return Err(StateError::DuplicateName {
                    kind: T::KIND,
                    key: key.to_string(),
                });
            }
        }
        let name = stored.entity.name().filter(|name| !name.is_empty());
        if let Some(name) = name {
            if self.by_name.contains_key(name) {
                return Err(StateError::DuplicateName {
                    kind: T::KIND,
                    key: name.to_owned(),
                });
            }
        }
        let alias = stored.entity.alias().filter(|alias| !alias.is_empty());
        if let Some(alias) = alias {
            if self.by_alias.contains_key(alias) {
                return Err(StateError::DuplicateName {
                    kind: T::KIND,
                    key: alias.to_owned(),
                });
            }
        }
        if self.by_identity.contains_key(&stored.identity) {
            return Err(StateError::DuplicateName {
                kind: T::KIND,
                key: stored.identity.to_string(),
            });
        }

        let slot = self.slots.len();
        if let Some(id) = id {
            self.by_id.insert(id.to_owned(), slot);
        }
        if let Some(key) = &stored.key {
            self.by_key.insert(key.clone(), slot);
        }
        if let Some(name) = name {
            self.by_name.insert(name.to_owned(), slot);
        }
        if let Some(alias) = alias {
            self.by_alias.insert(alias.to_owned(), slot);
        }
        for link in &stored.links {
            self.by_parent.insert(link.parent.clone(), slot);
        }
        self.by_identity.insert(stored.identity.clone(), slot);
        self.live += 1;
        self.slots.push(None);

        Ok(&*self.slots[slot].insert(stored))
    }

    /// Looks up a record by its exact identity.
    pub fn get(&self, identity: &Identity) -> Option<&Stored<T>> {
        self.by_identity.get(identity).and_then(|&slot| self.slot(slot))
    }

    /// Looks up a record by ID.
    pub fn get_by_id(&self, id: &str) -> Option<&Stored<T>> {
        self.by_id.get(id).and_then(|&slot| self.slot(slot))
    }

    /// Looks up a record by natural key.
    pub fn get_by_natural_key(&self, key: &NaturalKey) -> Option<&Stored<T>> {
        self.by_key.get(key).and_then(|&slot| self.slot(slot))
    }

    /// Looks up a record by name.
    pub fn get_by_name(&self, name: &str) -> Option<&Stored<T>> {
        self.by_name.get(name).and_then(|&slot| self.slot(slot))
    }

    /// Looks up a record by its second reference name.
    pub fn get_by_alias(&self, alias: &str) -> Option<&Stored<T>> {
        self.by_alias.get(alias).and_then(|&slot| self.slot(slot))
    }

    /// Finds the record that `identity` denotes, even if it was resolved in
    /// another aggregate: ID identities match by ID, key identities by
    /// natural key.
    pub fn find(&self, identity: &Identity) -> Option<&Stored<T>> {
        match identity {
            Identity::Id { id, .. } => self.get_by_id(id),
            Identity::Key { key, .. } => self.get_by_natural_key(key),
        }
    }

    /// Resolves a foreign-key reference: by ID first, then by name, then
    /// by alias.
    pub fn lookup(&self, reference: &str) -> Option<&Stored<T>> {
        self.get_by_id(reference)
            .or_else(|| self.get_by_name(reference))
            .or_else(|| self.get_by_alias(reference))
    }

    /// Records of this kind linked to `parent`, in insertion order.
    pub fn children_of<'a>(&'a self, parent: &Identity) -> impl Iterator<Item = &'a Stored<T>> + 'a {
        let slots: Vec<usize> = self.by_parent.lookup(parent).collect();
        slots.into_iter().filter_map(move |slot| self.slot(slot))
    }

    /// All records in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Stored<T>> {
        self.slots.iter().flatten()
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of records in other collections linked to `identity`.
    #[must_use]
    pub fn referrers(&self, identity: &Identity) -> usize {
        self.referrers.get(identity).copied().unwrap_or(0)
    }

    /// Removes a record.
    ///
    /// Fails with `ReferencedEntity` while other records still link to it.
    pub fn delete(&mut self, identity: &Identity) -> StateResult<Stored<T>> {
        let referrers = self.referrers(identity);
        if referrers > 0 {
            return Err(StateError::ReferencedEntity {
                identity: identity.clone(),
                referrers,
            });
        }
        let slot = self
            .by_identity
            .remove(identity)
            .ok_or_else(|| StateError::NotFound {
                identity: identity.clone(),
            })?;
        let stored = self.slots[slot].take().ok_or_else(|| StateError::NotFound {
            identity: identity.clone(),
        })?;

        if let Some(id) = stored.entity.id() {
            self.by_id.remove(id);
        }
        if let Some(key) = &stored.key {
            self.by_key.remove(key);
        }
        if let Some(name) = stored.entity.name() {
            self.by_name.remove(name);
        }
        if let Some(alias) = stored.entity.alias() {
            self.by_alias.remove(alias);
        }
        for link in &stored.links {
            self.by_parent.remove(&link.parent, slot);
        }
        self.referrers.remove(identity);
        self.live -= 1;
        Ok(stored)
    }

    pub(crate) fn retain(&mut self, identity: &Identity) {
        *self.referrers.entry(identity.clone()).or_insert(0) += 1;
    }

    pub(crate) fn release(&mut self, identity: &Identity) {
        if let Some(count) = self.referrers.get_mut(identity) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.referrers.remove(identity);
            }
        }
    }

    fn slot(&self, slot: usize) -> Option<&Stored<T>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind-erased view of a collection, for code that dispatches on
/// `EntityKind` at runtime.
pub(crate) trait Table {
    fn kind(&self) -> EntityKind;
    fn resolve_reference(&self, reference: &str) -> Option<ParentRef>;
    fn find_identity(&self, identity: &Identity) -> Option<&Identity>;
    fn contains(&self, identity: &Identity) -> bool;
    fn label_of(&self, identity: &Identity) -> Option<String>;
    fn referrer_count(&self, identity: &Identity) -> usize;
    fn link_table(&self) -> Vec<(Identity, Link)>;
    fn identities(&self) -> Vec<Identity>;
    fn retain_ref(&mut self, identity: &Identity);
    fn release_ref(&mut self, identity: &Identity);
}

impl<T: Entity> Table for Collection<T> {
    fn kind(&self) -> EntityKind {
        T::KIND
    }

    fn resolve_reference(&self, reference: &str) -> Option<ParentRef> {
        self.lookup(reference).map(|stored| ParentRef {
            identity: stored.identity.clone(),
            component: stored.key_component(),
        })
    }

    fn find_identity(&self, identity: &Identity) -> Option<&Identity> {
        self.find(identity).map(Stored::identity)
    }

    fn contains(&self, identity: &Identity) -> bool {
        self.by_identity.contains_key(identity)
    }

    fn label_of(&self, identity: &Identity) -> Option<String> {
        self.get(identity).map(|stored| stored.entity.label())
    }

    fn referrer_count(&self, identity: &Identity) -> usize {
        self.referrers(identity)
    }

    fn link_table(&self) -> Vec<(Identity, Link)> {
        self.all()
            .flat_map(|stored| {
                stored
                    .links
                    .iter()
                    .map(move |link| (stored.identity.clone(), link.clone()))
            })
            .collect()
    }

    fn identities(&self) -> Vec<Identity> {
        self.all().map(|stored| stored.identity.clone()).collect()
    }

    fn retain_ref(&mut self, identity: &Identity) {
        self.retain(identity);
    }

    fn release_ref(&mut self, identity: &Identity) {
        self.release(identity);
    }
}
