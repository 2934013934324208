//! Record types for the eleven entity kinds.

use super::{Entity, EntityRecord};
use crate::collection::Collection;
use crate::state::StateAggregate;
use crate::types::{EntityKind, ForeignKey, Relation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// An upstream service behind the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Upstream host.
    #[serde(default)]
    pub host: String,
    /// Upstream port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Upstream protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Path prefix on the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Proxy retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Connect timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    /// Read timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    /// Write timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u64>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Service {
    /// Creates a named service pointing at `host`.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            host: host.into(),
            ..Self::default()
        }
    }
}

impl Entity for Service {
    const KIND: EntityKind = EntityKind::Service;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        self.name.clone().map(|name| vec![name])
    }

    fn apply_defaults(&mut self) {
        self.protocol.get_or_insert_with(|| "http".into());
        self.port.get_or_insert(80);
        self.retries.get_or_insert(5);
        self.connect_timeout.get_or_insert(60_000);
        self.read_timeout.get_or_insert(60_000);
        self.write_timeout.get_or_insert(60_000);
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.services
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.services
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Service(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Service(service) => Some(service),
            _ => None,
        }
    }
}

/// A route matching requests into a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning service, by ID or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Path prefixes, matched in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// HTTP methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Host names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Accepted protocols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    /// Strip the matched path prefix before proxying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,
    /// Forward the client's Host header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Route {
    /// Creates a named route under `service`.
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            service: Some(service.into()),
            ..Self::default()
        }
    }
}

impl Entity for Route {
    const KIND: EntityKind = EntityKind::Route;
    const SCOPED_KEY: bool = false;
    const RELATIONS: &'static [Relation] = &[Relation::Service];
    const UNORDERED_FIELDS: &'static [&'static str] = &["tags", "methods", "hosts", "protocols"];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        self.name.clone().map(|name| vec![name])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        self.service
            .iter()
            .map(|service| ForeignKey::new(Relation::Service, service.clone()))
            .collect()
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Service {
            self.service = Some(reference);
        }
    }

    fn apply_defaults(&mut self) {
        if self.protocols.is_empty() {
            self.protocols = vec!["http".into(), "https".into()];
        }
        self.strip_path.get_or_insert(true);
        self.preserve_host.get_or_insert(false);
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.routes
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.routes
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Route(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Route(route) => Some(route),
            _ => None,
        }
    }
}

/// A load-balancing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name (a virtual host name).
    #[serde(default)]
    pub name: String,
    /// Number of balancer slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Upstream {
    /// Creates a named upstream.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Upstream {
    const KIND: EntityKind = EntityKind::Upstream;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.name).map(|name| vec![name.to_owned()])
    }

    fn apply_defaults(&mut self) {
        self.slots.get_or_insert(10_000);
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.upstreams
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.upstreams
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Upstream(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Upstream(upstream) => Some(upstream),
            _ => None,
        }
    }
}

/// A target address within an upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning upstream, by ID or name.
    #[serde(default)]
    pub upstream: String,
    /// `host:port` address.
    #[serde(default)]
    pub target: String,
    /// Balancer weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Target {
    /// Creates a target under `upstream`.
    pub fn new(upstream: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            target: target.into(),
            ..Self::default()
        }
    }
}

impl Entity for Target {
    const KIND: EntityKind = EntityKind::Target;
    const RELATIONS: &'static [Relation] = &[Relation::Upstream];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.target).map(|target| vec![target.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(Relation::Upstream, self.upstream.clone())]
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Upstream {
            self.upstream = reference;
        }
    }

    fn apply_defaults(&mut self) {
        self.weight.get_or_insert(100);
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.targets
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.targets
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Target(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Target(target) => Some(target),
            _ => None,
        }
    }
}

/// A TLS certificate, identified by the digest of its body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// PEM certificate body.
    #[serde(default)]
    pub cert: String,
    /// PEM private key.
    #[serde(default)]
    pub key: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Certificate {
    /// Creates a certificate from PEM material.
    pub fn new(cert: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    /// Hex SHA-256 of the trimmed certificate body.
    #[must_use]
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.cert.trim().as_bytes());
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Entity for Certificate {
    const KIND: EntityKind = EntityKind::Certificate;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(self.cert.trim()).map(|_| vec![self.digest()])
    }

    fn label(&self) -> String {
        match (self.id(), self.key_fields()) {
            (Some(id), _) => id.to_owned(),
            (None, Some(_)) => format!("sha256:{}", &self.digest()[..12]),
            (None, None) => "<unnamed>".to_owned(),
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.certificates
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.certificates
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Certificate(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Certificate(certificate) => Some(certificate),
            _ => None,
        }
    }
}

/// A plugin instance, global or attached to a service, route or consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Plugin type, e.g. `rate-limiting`.
    #[serde(default)]
    pub name: String,
    /// Attached service, by ID or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Attached route, by ID or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Attached consumer, by ID, username or custom ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
    /// Plugin configuration.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    /// Whether the plugin runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Protocols the plugin runs on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Plugin {
    /// Creates a global plugin of type `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true when the plugin is not attached to anything.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.service.is_none() && self.route.is_none() && self.consumer.is_none()
    }
}

impl Entity for Plugin {
    const KIND: EntityKind = EntityKind::Plugin;
    const RELATIONS: &'static [Relation] = &[Relation::Service, Relation::Route, Relation::Consumer];
    const UNORDERED_FIELDS: &'static [&'static str] = &["tags", "protocols"];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.name).map(|name| vec![name.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        let mut keys = Vec::new();
        if let Some(service) = &self.service {
            keys.push(ForeignKey::new(Relation::Service, service.clone()));
        }
        if let Some(route) = &self.route {
            keys.push(ForeignKey::new(Relation::Route, route.clone()));
        }
        if let Some(consumer) = &self.consumer {
            keys.push(ForeignKey::new(Relation::Consumer, consumer.clone()));
        }
        keys
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        match relation {
            Relation::Service => self.service = Some(reference),
            Relation::Route => self.route = Some(reference),
            Relation::Consumer => self.consumer = Some(reference),
            Relation::Upstream => {}
        }
    }

    fn apply_defaults(&mut self) {
        self.enabled.get_or_insert(true);
        if self.protocols.is_empty() {
            self.protocols = vec!["grpc".into(), "grpcs".into(), "http".into(), "https".into()];
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.plugins
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.plugins
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Plugin(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Plugin(plugin) => Some(plugin),
            _ => None,
        }
    }
}

/// An API consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Unique custom identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Consumer {
    /// Creates a consumer with `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}

impl Entity for Consumer {
    const KIND: EntityKind = EntityKind::Consumer;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn name(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn alias(&self) -> Option<&str> {
        self.custom_id.as_deref()
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        match (&self.username, &self.custom_id) {
            (Some(username), _) => Some(vec![username.clone()]),
            (None, Some(custom_id)) => Some(vec!["custom_id".into(), custom_id.clone()]),
            (None, None) => None,
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.consumers
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.consumers
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Consumer(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Consumer(consumer) => Some(consumer),
            _ => None,
        }
    }
}

/// A key-auth credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyAuth {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning consumer, by ID, username or custom ID.
    #[serde(default)]
    pub consumer: String,
    /// The API key.
    #[serde(default)]
    pub key: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl KeyAuth {
    /// Creates a key credential for `consumer`.
    pub fn new(consumer: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            key: key.into(),
            ..Self::default()
        }
    }
}

impl Entity for KeyAuth {
    const KIND: EntityKind = EntityKind::KeyAuth;
    const RELATIONS: &'static [Relation] = &[Relation::Consumer];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.key).map(|key| vec![key.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(Relation::Consumer, self.consumer.clone())]
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Consumer {
            self.consumer = reference;
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.key_auths
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.key_auths
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::KeyAuth(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::KeyAuth(credential) => Some(credential),
            _ => None,
        }
    }
}

/// An HMAC-auth credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HmacAuth {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning consumer, by ID, username or custom ID.
    #[serde(default)]
    pub consumer: String,
    /// Credential username.
    #[serde(default)]
    pub username: String,
    /// Shared secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Entity for HmacAuth {
    const KIND: EntityKind = EntityKind::HmacAuth;
    const RELATIONS: &'static [Relation] = &[Relation::Consumer];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.username).map(|username| vec![username.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(Relation::Consumer, self.consumer.clone())]
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Consumer {
            self.consumer = reference;
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.hmac_auths
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.hmac_auths
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::HmacAuth(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::HmacAuth(credential) => Some(credential),
            _ => None,
        }
    }
}

/// A JWT credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtAuth {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning consumer, by ID, username or custom ID.
    #[serde(default)]
    pub consumer: String,
    /// Issuer key (`iss` claim).
    #[serde(default)]
    pub key: String,
    /// Signing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// HMAC secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// RSA public key for RS* algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsa_public_key: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Entity for JwtAuth {
    const KIND: EntityKind = EntityKind::JwtAuth;
    const RELATIONS: &'static [Relation] = &[Relation::Consumer];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.key).map(|key| vec![key.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(Relation::Consumer, self.consumer.clone())]
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Consumer {
            self.consumer = reference;
        }
    }

    fn apply_defaults(&mut self) {
        self.algorithm.get_or_insert_with(|| "HS256".into());
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.jwt_auths
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.jwt_auths
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::JwtAuth(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::JwtAuth(credential) => Some(credential),
            _ => None,
        }
    }
}

/// A basic-auth credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    /// Server-assigned ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning consumer, by ID, username or custom ID.
    #[serde(default)]
    pub consumer: String,
    /// Credential username.
    #[serde(default)]
    pub username: String,
    /// Password (hashed by the gateway on write).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Entity for BasicAuth {
    const KIND: EntityKind = EntityKind::BasicAuth;
    const RELATIONS: &'static [Relation] = &[Relation::Consumer];

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn key_fields(&self) -> Option<Vec<String>> {
        non_empty(&self.username).map(|username| vec![username.to_owned()])
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(Relation::Consumer, self.consumer.clone())]
    }

    fn set_foreign_key(&mut self, relation: Relation, reference: String) {
        if relation == Relation::Consumer {
            self.consumer = reference;
        }
    }

    fn collection(state: &StateAggregate) -> &Collection<Self> {
        &state.basic_auths
    }

    fn collection_mut(state: &mut StateAggregate) -> &mut Collection<Self> {
        &mut state.basic_auths
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::BasicAuth(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::BasicAuth(credential) => Some(credential),
            _ => None,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_serializes_without_empty_fields() {
        let route = Route::new("r1", "svc1");
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json, serde_json::json!({"name": "r1", "service": "svc1"}));
    }

    #[test]
    fn plugin_foreign_keys_follow_attachment() {
        let mut plugin = Plugin::new("rate-limiting");
        assert!(plugin.is_global());
        assert!(plugin.foreign_keys().is_empty());

        plugin.set_foreign_key(Relation::Route, "r1".into());
        plugin.set_foreign_key(Relation::Consumer, "alice".into());
        let keys = plugin.foreign_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].relation, Relation::Route);
        assert_eq!(keys[1].reference, "alice");
    }

    #[test]
    fn consumer_key_falls_back_to_custom_id() {
        let consumer = Consumer {
            custom_id: Some("c-1".into()),
            ..Consumer::default()
        };
        assert_eq!(consumer.name(), None);
        assert_eq!(consumer.alias(), Some("c-1"));
        assert_eq!(consumer.label(), "c-1");
        assert_eq!(
            consumer.key_fields(),
            Some(vec!["custom_id".to_string(), "c-1".to_string()])
        );
        assert_eq!(Consumer::default().key_fields(), None);
    }

    #[test]
    fn certificate_key_is_body_digest() {
        let a = Certificate::new("-----BEGIN CERTIFICATE-----\nabc\n", "k1");
        let b = Certificate::new("  -----BEGIN CERTIFICATE-----\nabc", "k2");
        assert_eq!(a.key_fields(), b.key_fields());
        assert_eq!(a.digest().len(), 64);
        assert!(a.label().starts_with("sha256:"));
    }

    #[test]
    fn defaults_fill_only_missing_fields() {
        let mut service = Service::new("svc", "example.com");
        service.port = Some(8080);
        service.apply_defaults();
        assert_eq!(service.port, Some(8080));
        assert_eq!(service.protocol.as_deref(), Some("http"));

        let mut target = Target::new("up", "10.0.0.1:80");
        target.apply_defaults();
        assert_eq!(target.weight, Some(100));
    }

    #[test]
    fn target_requires_address_for_key() {
        let target = Target::new("up", "");
        assert_eq!(target.key_fields(), None);
        assert_eq!(target.label(), "<unnamed>");
    }
}
