//! In-memory gateway.
//!
//! A thread-safe model of the admin API used by tests and dry experiments.
//! It assigns UUIDs, fills server defaults (plugin config included),
//! enforces foreign keys, unique natural keys and reference protection,
//! and can be told to fail.

use crate::client::AdminClient;
use crate::error::{AdminError, AdminResult};
use gatesync_core::{EntityKind, EntityRecord, RawState};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// An admin API call, for counters and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GatewayCall {
    /// `list`.
    List,
    /// `create`.
    Create,
    /// `update`.
    Update,
    /// `delete`.
    Delete,
}

/// A scripted failure.
#[derive(Debug, Clone)]
struct Fault {
    call: GatewayCall,
    kind: Option<EntityKind>,
    label: Option<String>,
    error: AdminError,
    remaining: usize,
}

impl Fault {
    fn matches(&self, call: GatewayCall, record: Option<&EntityRecord>, kind: EntityKind) -> bool {
        self.remaining > 0
            && self.call == call
            && self.kind.map_or(true, |k| k == kind)
            && self
                .label
                .as_deref()
                .map_or(true, |label| record.is_some_and(|r| r.label() == label))
    }
}

/// Builder for a scripted failure.
#[derive(Debug, Clone)]
pub struct FaultBuilder {
    fault: Fault,
}

impl FaultBuilder {
    /// Fails `call` with `error`, once, for every kind.
    pub fn new(call: GatewayCall, error: AdminError) -> Self {
        Self {
            fault: Fault {
                call,
                kind: None,
                label: None,
                error,
                remaining: 1,
            },
        }
    }

    /// Restricts the fault to one kind.
    pub fn for_kind(mut self, kind: EntityKind) -> Self {
        self.fault.kind = Some(kind);
        self
    }

    /// Restricts the fault to records with this label.
    pub fn for_label(mut self, label: impl Into<String>) -> Self {
        self.fault.label = Some(label.into());
        self
    }

    /// Fails this many matching calls.
    pub fn times(mut self, times: usize) -> Self {
        self.fault.remaining = times;
        self
    }
}

/// Thread-safe in-memory admin API.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    /// Records per kind, in creation order.
    records: Mutex<BTreeMap<EntityKind, Vec<EntityRecord>>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<BTreeMap<GatewayCall, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl MemoryGateway {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call take at least `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues a scripted failure.
    pub fn inject(&self, fault: FaultBuilder) {
        self.faults.lock().push(fault.fault);
    }

    /// Number of calls of one type made so far.
    pub fn calls(&self, call: GatewayCall) -> usize {
        self.calls.lock().get(&call).copied().unwrap_or(0)
    }

    /// Number of mutating calls made so far.
    pub fn mutations(&self) -> usize {
        self.calls(GatewayCall::Create) + self.calls(GatewayCall::Update) + self.calls(GatewayCall::Delete)
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Resets call counters.
    pub fn reset_counters(&self) {
        self.calls.lock().clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    /// Every stored record, grouped by kind.
    pub fn snapshot(&self) -> RawState {
        let mut raw = RawState::new();
        for record in self.records.lock().values().flatten() {
            raw.push(record.clone());
        }
        raw
    }

    /// Number of stored records of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.records.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Runs `op` as one admin call: counts it, tracks concurrency, applies
    /// latency and scripted faults.
    fn call<T>(
        &self,
        call: GatewayCall,
        kind: EntityKind,
        record: Option<&EntityRecord>,
        op: impl FnOnce(&mut BTreeMap<EntityKind, Vec<EntityRecord>>) -> AdminResult<T>,
    ) -> AdminResult<T> {
        *self.calls.lock().entry(call).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let fault = {
            let mut faults = self.faults.lock();
            faults
                .iter_mut()
                .find(|fault| fault.matches(call, record, kind))
                .map(|fault| {
                    fault.remaining -= 1;
                    fault.error.clone()
                })
        };
        let result = match fault {
            Some(error) => Err(error),
            None => op(&mut *self.records.lock()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn find<'a>(records: &'a [EntityRecord], id: &str) -> Option<(usize, &'a EntityRecord)> {
    records
        .iter()
        .enumerate()
        .find(|(_, record)| record.id() == Some(id))
}

/// Plugin config keys the server fills when a request leaves them out.
fn plugin_config_defaults(plugin: &str) -> Vec<(&'static str, Value)> {
    match plugin {
        "rate-limiting" => vec![
            ("fault_tolerant", json!(true)),
            ("limit_by", json!("consumer")),
        ],
        "prometheus" => vec![("per_consumer", json!(false))],
        _ => Vec::new(),
    }
}

fn fill_server_defaults(record: &mut EntityRecord) {
    record.apply_defaults();
    if let EntityRecord::Plugin(plugin) = record {
        for (field, default) in plugin_config_defaults(&plugin.name) {
            plugin.config.entry(field).or_insert(default);
        }
    }
}

/// Foreign keys must name an existing parent by ID.
fn check_references(
    store: &BTreeMap<EntityKind, Vec<EntityRecord>>,
    record: &EntityRecord,
) -> AdminResult<()> {
    for fk in record.foreign_keys() {
        let parents = store
            .get(&fk.relation.parent_kind())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if find(parents, &fk.reference).is_none() {
            return Err(AdminError::status(
                400,
                format!(
                    "schema violation ({}: the foreign key '{}' does not reference an existing '{}' entity)",
                    fk.relation,
                    fk.reference,
                    fk.relation.parent_kind()
                ),
            ));
        }
    }
    Ok(())
}

/// Natural keys must be unique per kind, scoped by parent.
fn check_unique(records: &[EntityRecord], record: &EntityRecord) -> AdminResult<()> {
    let scope = |r: &EntityRecord| {
        let parents: Vec<String> = r.foreign_keys().into_iter().map(|fk| fk.reference).collect();
        (parents, r.key_fields())
    };
    let wanted = scope(record);
    let clash = records.iter().find(|other| {
        other.id() != record.id()
            && ((wanted.1.is_some() && scope(other) == wanted)
                || (record.name().is_some() && other.name() == record.name())
                || (record.alias().is_some() && other.alias() == record.alias()))
    });
    match clash {
        Some(other) => Err(AdminError::status(
            409,
            format!("UNIQUE violation detected on '{}'", other.label()),
        )),
        None => Ok(()),
    }
}

impl AdminClient for MemoryGateway {
    fn list(&self, kind: EntityKind) -> AdminResult<Vec<EntityRecord>> {
        self.call(GatewayCall::List, kind, None, |store| {
            Ok(store.get(&kind).cloned().unwrap_or_default())
        })
    }

    fn create(&self, record: &EntityRecord) -> AdminResult<EntityRecord> {
        let kind = record.kind();
        self.call(GatewayCall::Create, kind, Some(record), |store| {
            check_references(store, record)?;
            let mut created = record.clone();
            if let Some(id) = record.id() {
                if store.get(&kind).is_some_and(|rs| find(rs, id).is_some()) {
                    return Err(AdminError::status(409, format!("primary key '{id}' exists")));
                }
            } else {
                created.set_id(Uuid::new_v4().to_string());
            }
            fill_server_defaults(&mut created);

            let records = store.entry(kind).or_default();
            check_unique(records, &created)?;
            records.push(created.clone());
            Ok(created)
        })
    }

    fn update(&self, id: &str, record: &EntityRecord) -> AdminResult<EntityRecord> {
        let kind = record.kind();
        self.call(GatewayCall::Update, kind, Some(record), |store| {
            check_references(store, record)?;
            let mut updated = record.clone();
            updated.set_id(id.to_owned());
            fill_server_defaults(&mut updated);

            let records = store.entry(kind).or_default();
            let (index, _) = find(records, id)
                .ok_or_else(|| AdminError::status(404, format!("{kind} {id} not found")))?;
            check_unique(records, &updated)?;
            records[index] = updated.clone();
            Ok(updated)
        })
    }

    fn delete(&self, record: &EntityRecord) -> AdminResult<()> {
        let kind = record.kind();
        self.call(GatewayCall::Delete, kind, Some(record), |store| {
            let id = record
                .id()
                .ok_or_else(|| AdminError::InvalidRequest(format!("{} has no id", record.label())))?;

            let referrer = store.values().flatten().find(|other| {
                other
                    .foreign_keys()
                    .iter()
                    .any(|fk| fk.relation.parent_kind() == kind && fk.reference == id)
            });
            if let Some(referrer) = referrer {
                return Err(AdminError::status(
                    400,
                    format!(
                        "an existing '{}' entity references this '{kind}' entity",
                        referrer.kind()
                    ),
                ));
            }

            let records = store.entry(kind).or_default();
            let (index, _) = find(records, id)
                .ok_or_else(|| AdminError::status(404, format!("{kind} {id} not found")))?;
            records.remove(index);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_core::{Consumer, Entity, KeyAuth, Plugin, Route, Service};

    fn create_service(gateway: &MemoryGateway, name: &str) -> EntityRecord {
        gateway
            .create(&Service::new(name, "example.com").into_record())
            .unwrap()
    }

    #[test]
    fn create_assigns_id_and_defaults() {
        let gateway = MemoryGateway::new();
        let created = create_service(&gateway, "svc1");
        assert!(created.id().is_some());

        let EntityRecord::Service(service) = &created else {
            panic!("expected a service");
        };
        assert_eq!(service.port, Some(80));
        assert_eq!(gateway.list(EntityKind::Service).unwrap(), vec![created.clone()]);
        assert_eq!(gateway.calls(GatewayCall::Create), 1);
    }

    #[test]
    fn create_fills_plugin_config_defaults() {
        let gateway = MemoryGateway::new();
        let mut plugin = Plugin::new("rate-limiting");
        plugin.config.insert("minute".into(), json!(5));
        plugin.config.insert("limit_by".into(), json!("ip"));

        let EntityRecord::Plugin(created) = gateway.create(&plugin.into_record()).unwrap() else {
            panic!("expected a plugin");
        };
        assert_eq!(created.config["minute"], json!(5));
        assert_eq!(created.config["limit_by"], json!("ip"));
        assert_eq!(created.config["fault_tolerant"], json!(true));
    }

    #[test]
    fn username_and_custom_id_do_not_clash() {
        let gateway = MemoryGateway::new();
        gateway.create(&Consumer::new("x").into_record()).unwrap();
        let by_custom_id = Consumer {
            custom_id: Some("x".into()),
            ..Consumer::default()
        };
        gateway.create(&by_custom_id.clone().into_record()).unwrap();

        let err = gateway.create(&by_custom_id.into_record()).unwrap_err();
        assert!(matches!(err, AdminError::Status { status: 409, .. }));
    }

    #[test]
    fn foreign_keys_must_resolve_by_id() {
        let gateway = MemoryGateway::new();
        create_service(&gateway, "svc1");
        // References by name are resolved client-side, never by the gateway.
        let err = gateway
            .create(&Route::new("r1", "svc1").into_record())
            .unwrap_err();
        assert!(matches!(err, AdminError::Status { status: 400, .. }));
    }

    #[test]
    fn names_are_unique() {
        let gateway = MemoryGateway::new();
        create_service(&gateway, "svc1");
        let err = gateway
            .create(&Service::new("svc1", "other.com").into_record())
            .unwrap_err();
        assert!(matches!(err, AdminError::Status { status: 409, .. }));
        assert_eq!(gateway.count(EntityKind::Service), 1);
    }

    #[test]
    fn referenced_records_cannot_be_deleted() {
        let gateway = MemoryGateway::new();
        let consumer = gateway
            .create(&Consumer::new("alice").into_record())
            .unwrap();
        let consumer_id = consumer.id().unwrap().to_owned();
        let credential = gateway
            .create(&KeyAuth::new(consumer_id, "k1").into_record())
            .unwrap();

        let err = gateway.delete(&consumer).unwrap_err();
        assert!(matches!(err, AdminError::Status { status: 400, .. }));

        gateway.delete(&credential).unwrap();
        gateway.delete(&consumer).unwrap();
        assert_eq!(gateway.snapshot().len(), 0);
    }

    #[test]
    fn update_replaces_fields() {
        let gateway = MemoryGateway::new();
        let created = create_service(&gateway, "svc1");
        let id = created.id().unwrap().to_owned();

        let mut service = Service::new("svc1", "changed.com");
        service.retries = Some(1);
        let updated = gateway.update(&id, &service.into_record()).unwrap();
        assert_eq!(updated.id(), Some(id.as_str()));

        let EntityRecord::Service(stored) = &gateway.list(EntityKind::Service).unwrap()[0] else {
            panic!("expected a service");
        };
        assert_eq!(stored.host, "changed.com");
        assert_eq!(stored.retries, Some(1));
    }

    #[test]
    fn update_of_missing_record_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .update("nope", &Service::new("svc1", "a.com").into_record())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn injected_faults_fire_then_clear() {
        let gateway = MemoryGateway::new();
        gateway.inject(
            FaultBuilder::new(GatewayCall::Create, AdminError::status(503, "busy"))
                .for_kind(EntityKind::Service)
                .times(2),
        );
        let record = Service::new("svc1", "a.com").into_record();
        assert!(gateway.create(&record).is_err());
        assert!(gateway.create(&record).is_err());
        assert!(gateway.create(&record).is_ok());
        assert_eq!(gateway.calls(GatewayCall::Create), 3);
    }

    #[test]
    fn faults_can_target_one_record() {
        let gateway = MemoryGateway::new();
        gateway.inject(
            FaultBuilder::new(GatewayCall::Create, AdminError::status(400, "bad"))
                .for_label("svc2"),
        );
        assert!(gateway.create(&Service::new("svc1", "a.com").into_record()).is_ok());
        assert!(gateway.create(&Service::new("svc2", "a.com").into_record()).is_err());
    }
}
