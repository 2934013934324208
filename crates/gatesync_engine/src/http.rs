//! HTTP admin client.
//!
//! The actual HTTP client is abstracted via a trait so the CLI can plug in
//! reqwest while tests route requests to an in-process fake.

use crate::client::AdminClient;
use crate::error::{AdminError, AdminResult};
use gatesync_core::{EntityKind, EntityRecord, Relation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl Method {
    /// The method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations send a JSON body (when present) and return whatever
/// the server answered. Failures to get an answer at all map to
/// [`AdminError::Transport`] or [`AdminError::Timeout`].
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> AdminResult<HttpResponse>;
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

/// Admin API client speaking JSON over an [`HttpClient`].
pub struct HttpAdminClient<H: HttpClient> {
    /// Base URL of the admin API (e.g., "http://localhost:8001").
    base_url: String,
    /// HTTP client implementation.
    http: H,
}

impl<H: HttpClient> HttpAdminClient<H> {
    /// Creates a new admin client.
    pub fn new(base_url: impl Into<String>, http: H) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> AdminResult<Option<Value>> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| AdminError::InvalidRequest(e.to_string()))?;

        let url = self.url(path);
        debug!(method = method.as_str(), %url, "admin API request");
        let response = self.http.send(method, &url, body)?;

        if !response.is_success() {
            return Err(AdminError::status(response.status, error_message(&response.body)));
        }
        if response.body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&response.body)
            .map(Some)
            .map_err(|e| AdminError::Decode(e.to_string()))
    }

    fn list_path(&self, kind: EntityKind, path: &str) -> AdminResult<Vec<EntityRecord>> {
        let mut records = Vec::new();
        let mut next = Some(path.to_owned());

        while let Some(path) = next.take() {
            let body = self
                .call(Method::Get, &path, None)?
                .ok_or_else(|| AdminError::Decode(format!("empty response from {path}")))?;
            let page: Page =
                serde_json::from_value(body).map_err(|e| AdminError::Decode(e.to_string()))?;
            for value in page.data {
                records.push(from_wire(kind, value)?);
            }
            next = page.next.filter(|next| !next.is_empty());
        }
        Ok(records)
    }
}

impl<H: HttpClient> AdminClient for HttpAdminClient<H> {
    fn list(&self, kind: EntityKind) -> AdminResult<Vec<EntityRecord>> {
        if kind == EntityKind::Target {
            // Targets are only listed per upstream.
            let mut targets = Vec::new();
            for upstream in self.list(EntityKind::Upstream)? {
                let id = upstream
                    .id()
                    .ok_or_else(|| AdminError::Decode("upstream without id".into()))?;
                targets.extend(self.list_path(kind, &format!("/upstreams/{id}/targets"))?);
            }
            return Ok(targets);
        }
        self.list_path(kind, list_endpoint(kind))
    }

    fn create(&self, record: &EntityRecord) -> AdminResult<EntityRecord> {
        let path = create_path(record)?;
        let body = to_wire(record, false)?;
        let created = self
            .call(Method::Post, &path, Some(&body))?
            .ok_or_else(|| AdminError::Decode(format!("empty response from {path}")))?;
        from_wire(record.kind(), created)
    }

    fn update(&self, id: &str, record: &EntityRecord) -> AdminResult<EntityRecord> {
        let path = entity_path(record, id)?;
        let body = to_wire(record, true)?;
        let updated = self
            .call(Method::Patch, &path, Some(&body))?
            .ok_or_else(|| AdminError::Decode(format!("empty response from {path}")))?;
        from_wire(record.kind(), updated)
    }

    fn delete(&self, record: &EntityRecord) -> AdminResult<()> {
        let id = record
            .id()
            .ok_or_else(|| AdminError::InvalidRequest(format!("{} has no id", record.label())))?;
        let path = entity_path(record, id)?;
        self.call(Method::Delete, &path, None)?;
        Ok(())
    }
}

/// Top-level collection segment of a kind.
fn collection(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Service => "services",
        EntityKind::Route => "routes",
        EntityKind::Upstream => "upstreams",
        EntityKind::Target => "targets",
        EntityKind::Certificate => "certificates",
        EntityKind::Plugin => "plugins",
        EntityKind::Consumer => "consumers",
        EntityKind::KeyAuth => "key-auth",
        EntityKind::HmacAuth => "hmac-auth",
        EntityKind::JwtAuth => "jwt",
        EntityKind::BasicAuth => "basic-auth",
    }
}

fn list_endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Service => "/services",
        EntityKind::Route => "/routes",
        EntityKind::Upstream => "/upstreams",
        EntityKind::Target => "/targets",
        EntityKind::Certificate => "/certificates",
        EntityKind::Plugin => "/plugins",
        EntityKind::Consumer => "/consumers",
        EntityKind::KeyAuth => "/key-auths",
        EntityKind::HmacAuth => "/hmac-auths",
        EntityKind::JwtAuth => "/jwts",
        EntityKind::BasicAuth => "/basic-auths",
    }
}

/// The parent segment of nested endpoints, e.g. `/consumers/{id}`.
fn parent_prefix(record: &EntityRecord) -> AdminResult<Option<String>> {
    let relation = match record.kind() {
        EntityKind::Target => Relation::Upstream,
        kind if kind.is_credential() => Relation::Consumer,
        _ => return Ok(None),
    };
    let parent = record
        .foreign_keys()
        .into_iter()
        .find(|fk| fk.relation == relation)
        .filter(|fk| !fk.reference.is_empty())
        .ok_or_else(|| {
            AdminError::InvalidRequest(format!("{} has no {relation}", record.label()))
        })?;
    Ok(Some(format!(
        "/{}/{}",
        collection(relation.parent_kind()),
        parent.reference
    )))
}

fn create_path(record: &EntityRecord) -> AdminResult<String> {
    let segment = collection(record.kind());
    Ok(match parent_prefix(record)? {
        Some(prefix) => format!("{prefix}/{segment}"),
        None => format!("/{segment}"),
    })
}

fn entity_path(record: &EntityRecord, id: &str) -> AdminResult<String> {
    Ok(format!("{}/{id}", create_path(record)?))
}

/// Flat record to API body: references become `{"id": ...}`.
///
/// Updates also send `null` for relations the record does not declare, so
/// a plugin can be detached.
fn to_wire(record: &EntityRecord, update: bool) -> AdminResult<Value> {
    let value = record
        .to_fields()
        .map_err(|e| AdminError::InvalidRequest(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(AdminError::InvalidRequest(format!(
            "{} is not an object",
            record.label()
        )));
    };

    if update {
        fields.remove("id");
        for relation in record.relations() {
            fields.insert(relation.field().to_owned(), Value::Null);
        }
    }
    for fk in record.foreign_keys() {
        let mut reference = Map::new();
        reference.insert("id".to_owned(), Value::String(fk.reference));
        fields.insert(fk.relation.field().to_owned(), Value::Object(reference));
    }
    Ok(Value::Object(fields))
}

/// API body to flat record: `{"id": ...}` references become plain IDs and
/// top-level nulls are dropped.
fn from_wire(kind: EntityKind, value: Value) -> AdminResult<EntityRecord> {
    let Value::Object(mut fields) = value else {
        return Err(AdminError::Decode(format!("{kind} is not an object")));
    };
    fields.retain(|_, value| !value.is_null());
    for relation in Relation::ALL {
        let id = match fields.get(relation.field()) {
            Some(Value::Object(reference)) => reference.get("id").and_then(Value::as_str),
            _ => continue,
        };
        match id.map(str::to_owned) {
            Some(id) => fields.insert(relation.field().to_owned(), Value::String(id)),
            None => fields.remove(relation.field()),
        };
    }
    EntityRecord::from_fields(kind, Value::Object(fields))
        .map_err(|e| AdminError::Decode(format!("{kind}: {e}")))
}

/// Pulls `message` out of an error body, falling back to the raw text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesync_core::{Entity, KeyAuth, Plugin, Route, Service, Target};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Answers from a script and records every request.
    #[derive(Default)]
    struct ScriptedHttp {
        responses: Mutex<VecDeque<AdminResult<HttpResponse>>>,
        requests: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    impl ScriptedHttp {
        fn reply(self, status: u16, body: Value) -> Self {
            self.responses
                .lock()
                .push_back(Ok(HttpResponse::new(status, body.to_string())));
            self
        }

        fn fail(self, error: AdminError) -> Self {
            self.responses.lock().push_back(Err(error));
            self
        }
    }

    impl HttpClient for ScriptedHttp {
        fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> AdminResult<HttpResponse> {
            let body = body.map(|bytes| serde_json::from_slice(&bytes).unwrap());
            self.requests.lock().push((method, url.to_owned(), body));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "")))
        }
    }

    fn client(http: ScriptedHttp) -> HttpAdminClient<ScriptedHttp> {
        HttpAdminClient::new("http://localhost:8001/", http)
    }

    #[test]
    fn list_follows_pagination() {
        let http = ScriptedHttp::default()
            .reply(
                200,
                json!({"data": [{"id": "s-1", "name": "a", "host": "a.test", "path": null}],
                       "next": "/services?offset=abc"}),
            )
            .reply(200, json!({"data": [{"id": "s-2", "name": "b", "host": "b.test"}], "next": null}));
        let admin = client(http);

        let services = admin.list(EntityKind::Service).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].id(), Some("s-2"));

        let requests = admin.http.requests.lock();
        assert_eq!(requests[0].1, "http://localhost:8001/services");
        assert_eq!(requests[1].1, "http://localhost:8001/services?offset=abc");
    }

    #[test]
    fn list_flattens_references() {
        let http = ScriptedHttp::default().reply(
            200,
            json!({"data": [{"id": "r-1", "name": "r1", "service": {"id": "s-1"}, "tags": null}]}),
        );
        let routes = client(http).list(EntityKind::Route).unwrap();
        let EntityRecord::Route(route) = &routes[0] else {
            panic!("expected a route");
        };
        assert_eq!(route.service.as_deref(), Some("s-1"));
        assert!(route.tags.is_empty());
    }

    #[test]
    fn targets_are_listed_per_upstream() {
        let http = ScriptedHttp::default()
            .reply(200, json!({"data": [{"id": "u-1", "name": "up1"}]}))
            .reply(
                200,
                json!({"data": [{"id": "t-1", "target": "10.0.0.1:80", "upstream": {"id": "u-1"}}]}),
            );
        let admin = client(http);
        let targets = admin.list(EntityKind::Target).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(
            admin.http.requests.lock()[1].1,
            "http://localhost:8001/upstreams/u-1/targets"
        );
    }

    #[test]
    fn create_nests_references() {
        let http = ScriptedHttp::default().reply(
            201,
            json!({"id": "r-1", "name": "r1", "service": {"id": "s-1"}, "created_at": 1}),
        );
        let admin = client(http);
        let created = admin.create(&Route::new("r1", "s-1").into_record()).unwrap();
        assert_eq!(created.id(), Some("r-1"));

        let requests = admin.http.requests.lock();
        let (method, url, body) = &requests[0];
        assert_eq!(*method, Method::Post);
        assert_eq!(url, "http://localhost:8001/routes");
        assert_eq!(body.as_ref().unwrap()["service"], json!({"id": "s-1"}));
    }

    #[test]
    fn credentials_use_nested_endpoints() {
        let http = ScriptedHttp::default()
            .reply(201, json!({"id": "k-1", "key": "secret", "consumer": {"id": "c-1"}}))
            .reply(204, json!(null));
        let admin = client(http);

        let created = admin.create(&KeyAuth::new("c-1", "secret").into_record()).unwrap();
        admin.delete(&created).unwrap();

        let requests = admin.http.requests.lock();
        assert_eq!(requests[0].1, "http://localhost:8001/consumers/c-1/key-auth");
        assert_eq!(requests[1].0, Method::Delete);
        assert_eq!(
            requests[1].1,
            "http://localhost:8001/consumers/c-1/key-auth/k-1"
        );
    }

    #[test]
    fn update_detaches_missing_relations() {
        let http = ScriptedHttp::default().reply(200, json!({"id": "p-1", "name": "cors"}));
        let admin = client(http);
        let mut plugin = Plugin::new("cors");
        plugin.id = Some("p-1".into());
        admin.update("p-1", &plugin.into_record()).unwrap();

        let requests = admin.http.requests.lock();
        let (method, url, body) = &requests[0];
        assert_eq!(*method, Method::Patch);
        assert_eq!(url, "http://localhost:8001/plugins/p-1");
        let body = body.as_ref().unwrap();
        assert_eq!(body["route"], Value::Null);
        assert!(body.get("id").is_none());
    }

    #[test]
    fn target_without_upstream_is_rejected() {
        let admin = client(ScriptedHttp::default());
        let err = admin.create(&Target::new("", "10.0.0.1:80").into_record()).unwrap_err();
        assert!(matches!(err, AdminError::InvalidRequest(_)));
    }

    #[test]
    fn status_errors_carry_the_message() {
        let http = ScriptedHttp::default().reply(409, json!({"message": "UNIQUE violation"}));
        let err = client(http)
            .create(&Service::new("svc1", "a.test").into_record())
            .unwrap_err();
        assert_eq!(err, AdminError::status(409, "UNIQUE violation"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_pass_through() {
        let http = ScriptedHttp::default().fail(AdminError::Timeout);
        let err = client(http).list(EntityKind::Consumer).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn undecodable_body_is_permanent() {
        let http = ScriptedHttp::default().reply(200, json!({"data": [{"id": "s-1", "port": "eighty"}]}));
        let err = client(http).list(EntityKind::Service).unwrap_err();
        assert!(matches!(err, AdminError::Decode(_)));
        assert!(!err.is_retryable());
    }
}
