//! reqwest-backed [`HttpClient`].

use crate::config::AdminConfig;
use crate::error::{CliError, CliResult};
use gatesync_engine::{AdminError, AdminResult, HttpClient, HttpResponse, Method};
use reqwest::blocking::{Client, Request};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Certificate, Url};
use std::fs;
use std::net::ToSocketAddrs;
use tracing::debug;

/// Blocking HTTP client with configured headers and TLS options.
pub struct ReqwestClient {
    client: Client,
    headers: HeaderMap,
}

impl ReqwestClient {
    /// Builds a client and the base URL to send requests to.
    ///
    /// With a TLS server name, the URL's host is replaced by that name and
    /// the name is pinned to the configured address, so SNI and certificate
    /// checks use the name while connections go to the address.
    pub fn connect(config: &AdminConfig) -> CliResult<(Self, String)> {
        let invalid = |reason: String| CliError::InvalidAddress {
            address: config.address.clone(),
            reason,
        };
        let mut url = Url::parse(&config.address).map_err(|e| invalid(e.to_string()))?;

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.tls_skip_verify);

        if let Some(path) = &config.ca_cert {
            let pem = fs::read(path).map_err(|e| CliError::io(path, e))?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        if let Some(name) = &config.tls_server_name {
            let host = url
                .host_str()
                .ok_or_else(|| invalid("missing host".into()))?
                .to_owned();
            let port = url
                .port_or_known_default()
                .ok_or_else(|| invalid("missing port".into()))?;
            let addr = (host.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| invalid(e.to_string()))?
                .next()
                .ok_or_else(|| invalid(format!("{host} did not resolve")))?;
            builder = builder.resolve(name, addr);
            url.set_host(Some(name.as_str()))
                .map_err(|e| invalid(e.to_string()))?;
            debug!(server_name = %name, %addr, "pinned TLS server name");
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header = format!("{name}:{value}");
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CliError::InvalidHeader(header.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| CliError::InvalidHeader(header.clone()))?;
            headers.insert(name, value);
        }

        let client = Self {
            client: builder.build()?,
            headers,
        };
        Ok((client, url.as_str().trim_end_matches('/').to_owned()))
    }

    /// Builds a request; configured headers replace any already present.
    fn prepare(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> AdminResult<Request> {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }
        let mut request = builder
            .build()
            .map_err(|e| AdminError::InvalidRequest(e.to_string()))?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
        Ok(request)
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> AdminResult<HttpResponse> {
        let request = self.prepare(method, url, body)?;
        debug!(method = method.as_str(), url, "admin request");
        let response = self.client.execute(request).map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(classify)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Maps reqwest failures onto retryable and permanent admin errors.
fn classify(err: reqwest::Error) -> AdminError {
    if err.is_timeout() {
        AdminError::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        AdminError::transient(err.to_string())
    } else if err.is_decode() {
        AdminError::Decode(err.to_string())
    } else {
        AdminError::permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: AdminConfig) -> (ReqwestClient, String) {
        ReqwestClient::connect(&config).unwrap()
    }

    #[test]
    fn configured_headers_replace_existing_ones() {
        let config = AdminConfig::new("http://127.0.0.1:8001")
            .with_headers(&["Content-Type: application/x-custom", "Kong-Admin-Token: secret"])
            .unwrap();
        let (client, base) = client(config);
        assert_eq!(base, "http://127.0.0.1:8001");

        let request = client
            .prepare(Method::Post, &format!("{base}/services"), Some(b"{}".to_vec()))
            .unwrap();
        let headers = request.headers();
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(headers[CONTENT_TYPE], "application/x-custom");
        assert_eq!(headers["kong-admin-token"], "secret");
    }

    #[test]
    fn bodies_are_json() {
        let (client, base) = client(AdminConfig::new("http://127.0.0.1:8001/"));
        assert_eq!(base, "http://127.0.0.1:8001");
        let request = client
            .prepare(Method::Patch, &format!("{base}/routes/r-1"), Some(b"{}".to_vec()))
            .unwrap();
        assert_eq!(*request.method(), reqwest::Method::PATCH);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");

        let request = client.prepare(Method::Get, &base, None).unwrap();
        assert!(request.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn server_name_rewrites_the_host() {
        let config = AdminConfig::new("https://127.0.0.1:8444")
            .with_tls_server_name(Some("admin.example.com".into()));
        let (_, base) = client(config);
        assert_eq!(base, "https://admin.example.com:8444");
    }

    #[test]
    fn bad_addresses_are_rejected() {
        let err = ReqwestClient::connect(&AdminConfig::new("not a url"))
            .err()
            .unwrap();
        assert!(matches!(err, CliError::InvalidAddress { .. }));
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let config = AdminConfig::new("http://127.0.0.1:8001")
            .with_headers(&["bad header: x"])
            .unwrap();
        let err = ReqwestClient::connect(&config).err().unwrap();
        assert!(matches!(err, CliError::InvalidHeader(_)));
    }
}
