//! Reading the current gateway state.

use crate::client::AdminClient;
use crate::error::SyncResult;
use gatesync_core::{DependencyGraph, RawState, StateAggregate};
use tracing::{debug, info};

/// Lists every kind in dependency order and builds the current aggregate.
pub fn fetch_state<C: AdminClient + ?Sized>(
    client: &C,
    graph: &DependencyGraph,
) -> SyncResult<StateAggregate> {
    let raw = fetch_raw(client, graph)?;
    let total = raw.len();
    let state = StateAggregate::build(raw, graph)?;
    info!(records = total, "fetched current state");
    Ok(state)
}

/// Lists every kind without building an aggregate.
pub fn fetch_raw<C: AdminClient + ?Sized>(
    client: &C,
    graph: &DependencyGraph,
) -> SyncResult<RawState> {
    let mut raw = RawState::new();
    for &kind in graph.topological_order() {
        let records = client.list(kind)?;
        debug!(kind = %kind, count = records.len(), "listed");
        for record in records {
            raw.push(record);
        }
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdminError, SyncError};
    use crate::memory::{FaultBuilder, GatewayCall, MemoryGateway};
    use gatesync_core::{Entity, EntityKind, Route, Service};

    #[test]
    fn fetches_every_kind() {
        let gateway = MemoryGateway::new();
        let service = gateway
            .create(&Service::new("svc1", "a.com").into_record())
            .unwrap();
        let service_id = service.id().unwrap().to_owned();
        gateway
            .create(&Route::new("r1", service_id.clone()).into_record())
            .unwrap();

        let graph = DependencyGraph::standard().unwrap();
        let state = fetch_state(&gateway, &graph).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(gateway.calls(GatewayCall::List), EntityKind::ALL.len());

        let stored = state.collection::<Route>().get_by_name("r1").unwrap();
        assert!(stored.identity().id().is_some());
        assert_eq!(stored.links()[0].parent.id(), Some(service_id.as_str()));
    }

    #[test]
    fn list_failures_propagate() {
        let gateway = MemoryGateway::new();
        gateway.inject(
            FaultBuilder::new(GatewayCall::List, AdminError::Timeout).for_kind(EntityKind::Upstream),
        );
        let graph = DependencyGraph::standard().unwrap();
        let err = fetch_state(&gateway, &graph).unwrap_err();
        assert!(matches!(err, SyncError::Admin(AdminError::Timeout)));
    }
}
