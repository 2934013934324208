//! Identity-to-ID registry for a sync run.
//!
//! Changes reference parents by identity. Parents that already exist are
//! bound to their remote IDs by the diff; parents created in the same run
//! get a write-once cell filled by the worker that completes the create.
//! The scheduler only dispatches a change after its parents' creates have
//! finished, so a dependent never observes an empty cell.

use crate::error::{AdminError, AdminResult};
use gatesync_core::{ChangeList, EntityRecord, Identity, Link, Operation};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Resolves identities to remote IDs.
#[derive(Debug, Default)]
pub struct IdRegistry {
    bindings: HashMap<Identity, String>,
    created: HashMap<Identity, OnceLock<String>>,
}

impl IdRegistry {
    /// Seeds the registry from a change list: its bindings plus one empty
    /// cell per create.
    pub fn new(changes: &ChangeList) -> Self {
        let created = changes
            .iter()
            .filter(|change| change.operation == Operation::Create)
            .map(|change| (change.identity.clone(), OnceLock::new()))
            .collect();
        Self {
            bindings: changes.bindings().clone(),
            created,
        }
    }

    /// Records the ID assigned to a created identity.
    ///
    /// Returns false if the identity has no cell or was already filled.
    pub fn fill(&self, identity: &Identity, id: String) -> bool {
        self.created
            .get(identity)
            .is_some_and(|cell| cell.set(id).is_ok())
    }

    /// Remote ID of `identity`, if known.
    pub fn resolve<'a>(&'a self, identity: &'a Identity) -> Option<&'a str> {
        if let Some(cell) = self.created.get(identity) {
            return cell.get().map(String::as_str);
        }
        self.bindings
            .get(identity)
            .map(String::as_str)
            .or_else(|| identity.id())
    }

    /// Rewrites the foreign keys of an outgoing record to remote IDs.
    pub fn rewrite(&self, record: &mut EntityRecord, links: &[Link]) -> AdminResult<()> {
        for link in links {
            let id = self.resolve(&link.parent).ok_or_else(|| {
                AdminError::InvalidRequest(format!(
                    "{} of {} is unresolved: {}",
                    link.relation,
                    record.label(),
                    link.parent
                ))
            })?;
            record.set_foreign_key(link.relation, id.to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_core::{
        diff, DependencyGraph, Entity, EntityKind, RawState, Relation, Route, Service,
        StateAggregate,
    };

    fn state(records: Vec<EntityRecord>) -> StateAggregate {
        let mut raw = RawState::new();
        for record in records {
            raw.push(record);
        }
        StateAggregate::build(raw, &DependencyGraph::standard().unwrap()).unwrap()
    }

    fn listed_service(name: &str, id: &str) -> EntityRecord {
        let mut service = Service::new(name, "a.com");
        service.id = Some(id.into());
        service.apply_defaults();
        service.into_record()
    }

    #[test]
    fn existing_parents_resolve_through_bindings() {
        let graph = DependencyGraph::standard().unwrap();
        let current = state(vec![listed_service("svc1", "s-1")]);
        let desired = state(vec![
            Service::new("svc1", "a.com").into_record(),
            Route::new("r1", "svc1").into_record(),
        ]);
        let changes = diff(&current, &desired, &graph).unwrap();
        let registry = IdRegistry::new(&changes);

        let create = &changes.changes()[0];
        assert_eq!(create.kind, EntityKind::Route);
        let mut record = create.record.clone();
        registry.rewrite(&mut record, &create.links).unwrap();
        assert_eq!(record.foreign_keys()[0].reference, "s-1");
    }

    #[test]
    fn created_parents_resolve_once_filled() {
        let graph = DependencyGraph::standard().unwrap();
        let desired = state(vec![
            Service::new("svc1", "a.com").into_record(),
            Route::new("r1", "svc1").into_record(),
        ]);
        let changes = diff(&StateAggregate::new(), &desired, &graph).unwrap();
        let registry = IdRegistry::new(&changes);

        let service = &changes.changes()[0];
        let route = &changes.changes()[1];
        let mut record = route.record.clone();
        assert!(registry.rewrite(&mut record, &route.links).is_err());

        assert!(registry.fill(&service.identity, "s-9".into()));
        assert!(!registry.fill(&service.identity, "s-10".into()));
        registry.rewrite(&mut record, &route.links).unwrap();
        assert_eq!(record.foreign_keys()[0].relation, Relation::Service);
        assert_eq!(record.foreign_keys()[0].reference, "s-9");
    }

    #[test]
    fn id_identities_resolve_to_themselves() {
        let registry = IdRegistry::default();
        let identity = Identity::Id {
            kind: EntityKind::Service,
            id: "s-1".into(),
        };
        assert_eq!(registry.resolve(&identity), Some("s-1"));
    }
}
