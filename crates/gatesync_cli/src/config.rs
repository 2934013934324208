//! Admin connection settings and state files.

use crate::error::{CliError, CliResult};
use gatesync_core::RawState;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default admin API address.
pub const DEFAULT_ADMIN_ADDR: &str = "http://localhost:8001";

/// How to reach the admin API.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Base URL of the admin API.
    pub address: String,
    /// Headers added to every request, replacing same-named ones.
    pub headers: Vec<(String, String)>,
    /// Accept any server certificate.
    pub tls_skip_verify: bool,
    /// Name to present and verify instead of the address's host.
    pub tls_server_name: Option<String>,
    /// PEM file with an extra trusted CA.
    pub ca_cert: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl AdminConfig {
    /// Creates a configuration for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            headers: Vec::new(),
            tls_skip_verify: false,
            tls_server_name: None,
            ca_cert: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Parses and adds `key:value` headers.
    pub fn with_headers<S: AsRef<str>>(mut self, headers: &[S]) -> CliResult<Self> {
        for header in headers {
            self.headers.push(parse_header(header.as_ref())?);
        }
        Ok(self)
    }

    /// Enables or disables certificate verification.
    pub fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    /// Sets the TLS server name.
    pub fn with_tls_server_name(mut self, name: Option<String>) -> Self {
        self.tls_server_name = name;
        self
    }

    /// Sets the extra CA certificate file.
    pub fn with_ca_cert(mut self, path: Option<PathBuf>) -> Self {
        self.ca_cert = path;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_ADDR)
    }
}

/// Splits a header on its first `:`. Both sides are trimmed.
pub fn parse_header(header: &str) -> CliResult<(String, String)> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| CliError::InvalidHeader(header.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidHeader(header.to_owned()));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

/// Reads a JSON state file. References may name parents or carry IDs.
pub fn load_state(path: &Path) -> CliResult<RawState> {
    let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Serializes a state as pretty JSON.
pub fn render_state(raw: &RawState) -> CliResult<String> {
    serde_json::to_string_pretty(raw).map_err(|source| CliError::Parse {
        path: PathBuf::from("<output>"),
        source,
    })
}

/// Writes a state file.
pub fn write_state(path: &Path, raw: &RawState) -> CliResult<()> {
    let mut text = render_state(raw)?;
    text.push('\n');
    fs::write(path, text).map_err(|e| CliError::io(path, e))
}
