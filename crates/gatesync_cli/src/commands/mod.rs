//! CLI command implementations.

pub mod diff;
pub mod dump;
pub mod sync;

use crate::config::{load_state, AdminConfig};
use crate::error::CliResult;
use crate::transport::ReqwestClient;
use gatesync_core::{diff as compute_diff, ChangeList, DependencyGraph, StateAggregate};
use gatesync_engine::{fetch_state, HttpAdminClient};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Admin client over reqwest.
pub type AdminHttp = HttpAdminClient<ReqwestClient>;

/// A connected admin API plus the dependency graph commands share.
pub struct Gateway {
    /// The admin client.
    pub client: Arc<AdminHttp>,
    /// The standard dependency graph.
    pub graph: DependencyGraph,
}

impl Gateway {
    /// Builds the admin client from `config`. No request is made yet.
    pub fn connect(config: &AdminConfig) -> CliResult<Self> {
        let (http, base_url) = ReqwestClient::connect(config)?;
        info!(admin = %base_url, "using admin API");
        Ok(Self {
            client: Arc::new(HttpAdminClient::new(base_url, http)),
            graph: DependencyGraph::standard()?,
        })
    }

    /// Lists the gateway's current state.
    pub fn current(&self) -> CliResult<StateAggregate> {
        Ok(fetch_state(&*self.client, &self.graph)?)
    }

    /// Loads `state_file` and diffs the gateway against it.
    pub fn plan(&self, state_file: &Path) -> CliResult<ChangeList> {
        let desired = StateAggregate::build(load_state(state_file)?, &self.graph)?;
        let current = self.current()?;
        Ok(compute_diff(&current, &desired, &self.graph)?)
    }
}

/// Prints a change list, or a note that there is nothing to do.
pub(crate) fn print_changes(changes: &ChangeList) {
    if changes.is_empty() {
        println!("No changes.");
    } else {
        println!("{changes}");
    }
}
