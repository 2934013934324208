//! Diff engine.
//!
//! [`diff`] pairs up the records of two aggregates by identity and emits
//! the create, update and delete events that turn the current state into
//! the desired one. Events reference parents by identity; turning those
//! into concrete IDs is the executor's job.

mod change;
mod delta;

pub use change::{Change, ChangeList, Operation};
pub use delta::FieldDelta;

use crate::collection::Stored;
use crate::entity::{
    BasicAuth, Certificate, Consumer, Entity, HmacAuth, JwtAuth, KeyAuth, Plugin, Route, Service,
    Target, Upstream,
};
use crate::error::{DiffError, DiffResult};
use crate::graph::DependencyGraph;
use crate::identity::Identity;
use crate::state::StateAggregate;
use crate::types::EntityKind;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Computes the changes that turn `current` into `desired`.
///
/// Neither input is modified. `diff(s, s)` is always empty.
pub fn diff(
    current: &StateAggregate,
    desired: &StateAggregate,
    graph: &DependencyGraph,
) -> DiffResult<ChangeList> {
    let mut plan = Plan::default();
    for &kind in graph.topological_order() {
        match kind {
            EntityKind::Service => plan.kind::<Service>(current, desired)?,
            EntityKind::Route => plan.kind::<Route>(current, desired)?,
            EntityKind::Upstream => plan.kind::<Upstream>(current, desired)?,
            EntityKind::Target => plan.kind::<Target>(current, desired)?,
            EntityKind::Certificate => plan.kind::<Certificate>(current, desired)?,
            EntityKind::Plugin => plan.kind::<Plugin>(current, desired)?,
            EntityKind::Consumer => plan.kind::<Consumer>(current, desired)?,
            EntityKind::KeyAuth => plan.kind::<KeyAuth>(current, desired)?,
            EntityKind::HmacAuth => plan.kind::<HmacAuth>(current, desired)?,
            EntityKind::JwtAuth => plan.kind::<JwtAuth>(current, desired)?,
            EntityKind::BasicAuth => plan.kind::<BasicAuth>(current, desired)?,
        }
    }
    let changes = plan.finish();
    info!(
        creates = changes.count(Operation::Create),
        updates = changes.count(Operation::Update),
        deletes = changes.count(Operation::Delete),
        "computed diff"
    );
    Ok(changes)
}

#[derive(Default)]
struct Plan {
    creates: Vec<Change>,
    updates: Vec<Change>,
    /// Deletes grouped per kind, in topological order.
    deletes: Vec<Vec<Change>>,
    bindings: HashMap<Identity, String>,
}

impl Plan {
    fn kind<T: Entity>(
        &mut self,
        current: &StateAggregate,
        desired: &StateAggregate,
    ) -> DiffResult<()> {
        let existing_records = T::collection(current);
        let mut matched: HashMap<&Identity, &Identity> = HashMap::new();
        let (mut creates, mut updates) = (0, 0);

        for wanted in T::collection(desired).all() {
            let Some(existing) = existing_records.find(wanted.identity()) else {
                self.creates.push(create(wanted));
                creates += 1;
                continue;
            };
            if let Some(first) = matched.insert(existing.identity(), wanted.identity()) {
                return Err(DiffError::AmbiguousMatch {
                    current: existing.identity().clone(),
                    first: first.clone(),
                    second: wanted.identity().clone(),
                });
            }
            if let Some(id) = existing.entity().id() {
                self.bindings
                    .insert(wanted.identity().clone(), id.to_owned());
            }
            let delta = record_delta(current, desired, existing, wanted)?;
            if !delta.is_empty() {
                self.updates.push(update(existing, wanted, delta));
                updates += 1;
            }
        }

        let deletes: Vec<Change> = existing_records
            .all()
            .filter(|existing| !matched.contains_key(existing.identity()))
            .map(delete)
            .collect();
        debug!(kind = %T::KIND, creates, updates, deletes = deletes.len(), "diffed kind");
        self.deletes.push(deletes);
        Ok(())
    }

    fn finish(self) -> ChangeList {
        let mut changes = self.creates;
        changes.extend(self.updates);
        changes.extend(self.deletes.into_iter().rev().flatten());
        ChangeList::new(changes, self.bindings)
    }
}

fn create<T: Entity>(wanted: &Stored<T>) -> Change {
    Change {
        operation: Operation::Create,
        kind: T::KIND,
        identity: wanted.identity().clone(),
        label: wanted.entity().label(),
        record: wanted.entity().clone().into_record(),
        links: wanted.links().to_vec(),
        previous_links: Vec::new(),
        remote_id: None,
        delta: Vec::new(),
    }
}

fn update<T: Entity>(existing: &Stored<T>, wanted: &Stored<T>, delta: Vec<FieldDelta>) -> Change {
    Change {
        operation: Operation::Update,
        kind: T::KIND,
        identity: wanted.identity().clone(),
        label: wanted.entity().label(),
        record: wanted.entity().clone().into_record(),
        links: wanted.links().to_vec(),
        previous_links: existing.links().to_vec(),
        remote_id: existing.entity().id().map(str::to_owned),
        delta,
    }
}

fn delete<T: Entity>(existing: &Stored<T>) -> Change {
    Change {
        operation: Operation::Delete,
        kind: T::KIND,
        identity: existing.identity().clone(),
        label: existing.entity().label(),
        record: existing.entity().clone().into_record(),
        links: existing.links().to_vec(),
        previous_links: Vec::new(),
        remote_id: existing.entity().id().map(str::to_owned),
        delta: Vec::new(),
    }
}

/// Field deltas plus one delta per relation whose parent changed.
fn record_delta<T: Entity>(
    current: &StateAggregate,
    desired: &StateAggregate,
    existing: &Stored<T>,
    wanted: &Stored<T>,
) -> DiffResult<Vec<FieldDelta>> {
    let label = wanted.entity().label();
    let old = comparable_fields(existing.entity(), &label)?;
    let new = comparable_fields(wanted.entity(), &label)?;
    let mut deltas = delta::compare_fields(T::KIND, &label, &old, &new, T::UNORDERED_FIELDS)?;

    for &relation in T::RELATIONS {
        let was = existing.link(relation);
        let now = wanted.link(relation);
        let changed = match (was, now) {
            (None, None) => false,
            (Some(was), Some(now)) => current.find_identity(&now.parent) != Some(&was.parent),
            _ => true,
        };
        if changed {
            deltas.push(FieldDelta::new(
                relation.field(),
                was.map(|link| parent_label(current, &link.parent)),
                now.map(|link| parent_label(desired, &link.parent)),
            ));
        }
    }
    deltas.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(deltas)
}

fn parent_label(state: &StateAggregate, parent: &Identity) -> Value {
    Value::String(
        state
            .label_of(parent)
            .unwrap_or_else(|| parent.to_string()),
    )
}

/// The record as a JSON object with defaults filled in and the ID and
/// reference fields removed.
fn comparable_fields<T: Entity>(entity: &T, label: &str) -> DiffResult<Map<String, Value>> {
    let mut record = entity.clone();
    record.apply_defaults();
    let serialization = |message: String| DiffError::Serialization {
        kind: T::KIND,
        entity: label.to_owned(),
        message,
    };

    let value = serde_json::to_value(&record).map_err(|e| serialization(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(serialization(format!(
            "expected an object, got {}",
            delta::type_name(&value)
        )));
    };
    fields.remove("id");
    for relation in T::RELATIONS {
        fields.remove(relation.field());
    }
    Ok(fields)
}
