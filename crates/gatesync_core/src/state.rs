//! The state aggregate: one collection per entity kind.

use crate::collection::{Collection, Link, ParentRef, Stored, Table};
use crate::entity::{
    BasicAuth, Certificate, Consumer, Entity, EntityRecord, HmacAuth, JwtAuth, KeyAuth, Plugin,
    Route, Service, Target, Upstream,
};
use crate::error::{ErrorSet, StateError, StateResult};
use crate::graph::DependencyGraph;
use crate::identity::{self, Identity, NaturalKey};
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Raw records grouped by kind, as produced by a config loader or by
/// listing the admin API.
///
/// Foreign keys are plain references (parent ID or name); nothing is
/// resolved or checked until [`StateAggregate::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawState {
    /// Services.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    /// Routes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Upstreams.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,
    /// Targets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    /// Certificates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
    /// Plugins.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    /// Consumers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<Consumer>,
    /// Key-auth credentials.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_auths: Vec<KeyAuth>,
    /// HMAC-auth credentials.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hmac_auths: Vec<HmacAuth>,
    /// JWT credentials.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jwt_auths: Vec<JwtAuth>,
    /// Basic-auth credentials.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub basic_auths: Vec<BasicAuth>,
}

impl RawState {
    /// Creates an empty raw state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the list for its kind.
    pub fn push(&mut self, record: EntityRecord) {
        match record {
            EntityRecord::Service(r) => self.services.push(r),
            EntityRecord::Route(r) => self.routes.push(r),
            EntityRecord::Upstream(r) => self.upstreams.push(r),
            EntityRecord::Target(r) => self.targets.push(r),
            EntityRecord::Certificate(r) => self.certificates.push(r),
            EntityRecord::Plugin(r) => self.plugins.push(r),
            EntityRecord::Consumer(r) => self.consumers.push(r),
            EntityRecord::KeyAuth(r) => self.key_auths.push(r),
            EntityRecord::HmacAuth(r) => self.hmac_auths.push(r),
            EntityRecord::JwtAuth(r) => self.jwt_auths.push(r),
            EntityRecord::BasicAuth(r) => self.basic_auths.push(r),
        }
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
            + self.routes.len()
            + self.upstreams.len()
            + self.targets.len()
            + self.certificates.len()
            + self.plugins.len()
            + self.consumers.len()
            + self.key_auths.len()
            + self.hmac_auths.len()
            + self.jwt_auths.len()
            + self.basic_auths.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A consistent, indexed snapshot of gateway configuration.
///
/// Every foreign key of every record resolves to a record in the same
/// aggregate. Construction either succeeds completely or returns the first
/// error; no partial aggregate escapes.
#[derive(Debug, Clone, Default)]
pub struct StateAggregate {
    pub(crate) services: Collection<Service>,
    pub(crate) routes: Collection<Route>,
    pub(crate) upstreams: Collection<Upstream>,
    pub(crate) targets: Collection<Target>,
    pub(crate) certificates: Collection<Certificate>,
    pub(crate) plugins: Collection<Plugin>,
    pub(crate) consumers: Collection<Consumer>,
    pub(crate) key_auths: Collection<KeyAuth>,
    pub(crate) hmac_auths: Collection<HmacAuth>,
    pub(crate) jwt_auths: Collection<JwtAuth>,
    pub(crate) basic_auths: Collection<BasicAuth>,
}

impl StateAggregate {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an aggregate, inserting kinds in the graph's topological order.
    ///
    /// Aborts with the first duplicate, dangling-reference or identity
    /// error.
    pub fn build(mut raw: RawState, graph: &DependencyGraph) -> StateResult<Self> {
        let mut state = Self::new();
        for &kind in graph.topological_order() {
            match kind {
                EntityKind::Service => state.insert_all(std::mem::take(&mut raw.services))?,
                EntityKind::Route => state.insert_all(std::mem::take(&mut raw.routes))?,
                EntityKind::Upstream => state.insert_all(std::mem::take(&mut raw.upstreams))?,
                EntityKind::Target => state.insert_all(std::mem::take(&mut raw.targets))?,
                EntityKind::Certificate => {
                    state.insert_all(std::mem::take(&mut raw.certificates))?
                }
                EntityKind::Plugin => state.insert_all(std::mem::take(&mut raw.plugins))?,
                EntityKind::Consumer => state.insert_all(std::mem::take(&mut raw.consumers))?,
                EntityKind::KeyAuth => state.insert_all(std::mem::take(&mut raw.key_auths))?,
                EntityKind::HmacAuth => state.insert_all(std::mem::take(&mut raw.hmac_auths))?,
                EntityKind::JwtAuth => state.insert_all(std::mem::take(&mut raw.jwt_auths))?,
                EntityKind::BasicAuth => {
                    state.insert_all(std::mem::take(&mut raw.basic_auths))?
                }
            }
        }
        debug!(entities = state.len(), "built state aggregate");
        Ok(state)
    }

    fn insert_all<T: Entity>(&mut self, records: Vec<T>) -> StateResult<()> {
        for record in records {
            self.insert(record)?;
        }
        Ok(())
    }

    /// Inserts one record, resolving its foreign keys against the
    /// collections already populated.
    pub fn insert<T: Entity>(&mut self, entity: T) -> StateResult<Identity> {
        let mut links = Vec::new();
        let mut components = Vec::new();
        for fk in entity.foreign_keys() {
            let parent = self
                .table(fk.relation.parent_kind())
                .resolve_reference(&fk.reference)
                .ok_or_else(|| StateError::DanglingReference {
                    kind: T::KIND,
                    entity: entity.label(),
                    relation: fk.relation,
                    reference: fk.reference.clone(),
                })?;
            let ParentRef {
                identity,
                component,
            } = parent;
            links.push(Link::new(fk.relation, identity));
            components.push((fk.relation, component));
        }

        let key = entity
            .key_fields()
            .map(|fields| {
                let scope = if T::SCOPED_KEY { components.as_slice() } else { &[] };
                NaturalKey::compose(scope, &fields)
            });
        let identity = identity::resolve(T::KIND, entity.id(), key.as_ref(), &entity.label())?;

        T::collection_mut(self).insert(Stored::new(entity, identity.clone(), key, links.clone()))?;
        for link in &links {
            self.table_mut(link.relation.parent_kind())
                .retain_ref(&link.parent);
        }
        Ok(identity)
    }

    /// Deletes a record, releasing its hold on its parents.
    ///
    /// Fails with `ReferencedEntity` while children still link to it.
    pub fn delete<T: Entity>(&mut self, identity: &Identity) -> StateResult<T> {
        let stored = T::collection_mut(self).delete(identity)?;
        for link in stored.links() {
            self.table_mut(link.relation.parent_kind())
                .release_ref(&link.parent);
        }
        Ok(stored.entity().clone())
    }

    /// Re-walks every link and reference count.
    ///
    /// Returns every inconsistency found, in graph order.
    pub fn validate(&self, graph: &DependencyGraph) -> Result<(), ErrorSet<StateError>> {
        let mut errors = ErrorSet::new();
        let mut counts: HashMap<Identity, usize> = HashMap::new();

        for &kind in graph.topological_order() {
            for (child, link) in self.table(kind).link_table() {
                let parent_table = self.table(link.relation.parent_kind());
                if parent_table.contains(&link.parent) {
                    *counts.entry(link.parent.clone()).or_insert(0) += 1;
                } else {
                    errors.push(StateError::BrokenLink {
                        identity: child,
                        relation: link.relation,
                        parent: link.parent,
                    });
                }
            }
        }

        for &kind in graph.topological_order() {
            let table = self.table(kind);
            for identity in table.identities() {
                let recorded = table.referrer_count(&identity);
                let actual = counts.get(&identity).copied().unwrap_or(0);
                if recorded != actual {
                    errors.push(StateError::ReferenceCountMismatch {
                        identity,
                        recorded,
                        actual,
                    });
                }
            }
        }

        errors.into_result(())
    }

    /// The collection for records of type `T`.
    pub fn collection<T: Entity>(&self) -> &Collection<T> {
        T::collection(self)
    }

    /// Label of the record `identity` names, if present.
    #[must_use]
    pub fn label_of(&self, identity: &Identity) -> Option<String> {
        self.table(identity.kind()).label_of(identity)
    }

    /// Identity within this aggregate of the record that `identity`
    /// (possibly resolved elsewhere) denotes.
    #[must_use]
    pub fn find_identity(&self, identity: &Identity) -> Option<&Identity> {
        self.table(identity.kind()).find_identity(identity)
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        EntityKind::ALL.iter().map(|&kind| self.count(kind)).sum()
    }

    /// Returns true if the aggregate holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.table(kind).identities().len()
    }

    /// Copies the records back out, in insertion order per kind.
    #[must_use]
    pub fn to_raw(&self) -> RawState {
        fn records<T: Entity>(collection: &Collection<T>) -> Vec<T> {
            collection.all().map(|stored| stored.entity().clone()).collect()
        }
        RawState {
            services: records(&self.services),
            routes: records(&self.routes),
            upstreams: records(&self.upstreams),
            targets: records(&self.targets),
            certificates: records(&self.certificates),
            plugins: records(&self.plugins),
            consumers: records(&self.consumers),
            key_auths: records(&self.key_auths),
            hmac_auths: records(&self.hmac_auths),
            jwt_auths: records(&self.jwt_auths),
            basic_auths: records(&self.basic_auths),
        }
    }

    pub(crate) fn table(&self, kind: EntityKind) -> &dyn Table {
        match kind {
            EntityKind::Service => &self.services,
            EntityKind::Route => &self.routes,
            EntityKind::Upstream => &self.upstreams,
            EntityKind::Target => &self.targets,
            EntityKind::Certificate => &self.certificates,
            EntityKind::Plugin => &self.plugins,
            EntityKind::Consumer => &self.consumers,
            EntityKind::KeyAuth => &self.key_auths,
            EntityKind::HmacAuth => &self.hmac_auths,
            EntityKind::JwtAuth => &self.jwt_auths,
            EntityKind::BasicAuth => &self.basic_auths,
        }
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut dyn Table {
        match kind {
            EntityKind::Service => &mut self.services,
            EntityKind::Route => &mut self.routes,
            EntityKind::Upstream => &mut self.upstreams,
            EntityKind::Target => &mut self.targets,
            EntityKind::Certificate => &mut self.certificates,
            EntityKind::Plugin => &mut self.plugins,
            EntityKind::Consumer => &mut self.consumers,
            EntityKind::KeyAuth => &mut self.key_auths,
            EntityKind::HmacAuth => &mut self.hmac_auths,
            EntityKind::JwtAuth => &mut self.jwt_auths,
            EntityKind::BasicAuth => &mut self.basic_auths,
        }
    }
}
