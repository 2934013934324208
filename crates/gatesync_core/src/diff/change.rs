//! Change events and the ordered change list.

use super::delta::FieldDelta;
use crate::collection::Link;
use crate::entity::EntityRecord;
use crate::identity::Identity;
use crate::types::EntityKind;
use std::collections::HashMap;
use std::fmt;

/// What a change does to the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a record that exists only in the desired state.
    Create,
    /// Update a record present on both sides whose fields differ.
    Update,
    /// Delete a record that exists only in the current state.
    Delete,
}

impl Operation {
    /// Present-participle verb used in listings.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// One create, update or delete event.
///
/// Parent references are held as identities, never as concrete IDs: a
/// parent created in the same run has no ID until its create completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The operation.
    pub operation: Operation,
    /// Entity kind.
    pub kind: EntityKind,
    /// Desired-side identity for creates and updates, current-side for
    /// deletes.
    pub identity: Identity,
    /// Human-readable handle.
    pub label: String,
    /// Desired record for creates and updates, current record for deletes.
    pub record: EntityRecord,
    /// Parent links on the side `identity` belongs to.
    pub links: Vec<Link>,
    /// Current-side parent links of an updated record.
    pub previous_links: Vec<Link>,
    /// Server-assigned ID of the current record (updates and deletes).
    pub remote_id: Option<String>,
    /// Changed fields (updates only).
    pub delta: Vec<FieldDelta>,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.operation.verb(), self.kind, self.label)?;
        for delta in &self.delta {
            write!(f, "\n    {delta}")?;
        }
        Ok(())
    }
}

/// The diff result: every create (parents first), then every update, then
/// every delete (children first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeList {
    changes: Vec<Change>,
    bindings: HashMap<Identity, String>,
}

impl ChangeList {
    pub(crate) fn new(changes: Vec<Change>, bindings: HashMap<Identity, String>) -> Self {
        Self { changes, bindings }
    }

    /// The events in apply order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Iterates over the events in apply order.
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Desired identity to remote ID for every desired record that already
    /// exists remotely.
    #[must_use]
    pub fn bindings(&self) -> &HashMap<Identity, String> {
        &self.bindings
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the two states already agree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of events performing `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.changes
            .iter()
            .filter(|change| change.operation == operation)
            .count()
    }
}

impl<'a> IntoIterator for &'a ChangeList {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl fmt::Display for ChangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{change}")?;
        }
        write!(
            f,
            "Summary:\n  Created: {}\n  Updated: {}\n  Deleted: {}",
            self.count(Operation::Create),
            self.count(Operation::Update),
            self.count(Operation::Delete)
        )
    }
}
