//! Dependency-ordered sync executor.
//!
//! Applies a [`ChangeList`] to a gateway through an [`AdminClient`] with a
//! bounded pool of worker threads. Events are released to workers only once
//! every event they depend on has been applied:
//!
//! - a create or update waits for the creates of the parents it links to;
//! - a delete waits for every delete or update whose current-side links
//!   point at the deleted record.
//!
//! Only links the dependency graph permits produce scheduling edges. A
//! failed event skips its dependents transitively while independent events
//! keep running.

use crate::client::AdminClient;
use crate::config::SyncConfig;
use crate::error::{AdminError, AdminResult, ChangeError, SyncError, SyncResult};
use crate::registry::IdRegistry;
use gatesync_core::{
    Change, ChangeList, DependencyGraph, EntityKind, ErrorSet, Identity, Link, Operation,
};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long an idle worker sleeps before re-checking for cancellation.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Cancels a running sync from another thread.
///
/// Cancellation stops dispatch. Calls already in flight run to completion;
/// nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an untriggered handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded.
    Applied {
        /// Remote ID of the affected record.
        remote_id: Option<String>,
        /// Attempts made; zero in dry-run mode.
        attempts: u32,
    },
    /// The call failed permanently or ran out of attempts.
    Failed {
        /// The last error.
        error: AdminError,
        /// Attempts made.
        attempts: u32,
    },
    /// Never attempted because an event it depends on failed.
    Skipped {
        /// The failed event, e.g. `create service svc1`.
        dependency: String,
    },
    /// Never dispatched because the run was cancelled.
    Cancelled,
}

impl Outcome {
    fn retries(&self) -> u64 {
        match self {
            Outcome::Applied { attempts, .. } | Outcome::Failed { attempts, .. } => {
                u64::from(attempts.saturating_sub(1))
            }
            Outcome::Skipped { .. } | Outcome::Cancelled => 0,
        }
    }
}

/// Per-event report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    /// The operation.
    pub operation: Operation,
    /// Entity kind.
    pub kind: EntityKind,
    /// Human-readable handle.
    pub label: String,
    /// The outcome.
    pub outcome: Outcome,
}

impl EventReport {
    fn error(&self) -> Option<ChangeError> {
        let (operation, kind, entity) = (self.operation, self.kind, self.label.clone());
        match &self.outcome {
            Outcome::Applied { .. } => None,
            Outcome::Failed { error, attempts } => Some(ChangeError::Failed {
                operation,
                kind,
                entity,
                attempts: *attempts,
                source: error.clone(),
            }),
            Outcome::Skipped { dependency } => Some(ChangeError::Skipped {
                operation,
                kind,
                entity,
                dependency: dependency.clone(),
            }),
            Outcome::Cancelled => Some(ChangeError::Cancelled {
                operation,
                kind,
                entity,
            }),
        }
    }
}

/// Counters for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records created.
    pub created: u64,
    /// Records updated.
    pub updated: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Events that failed.
    pub failed: u64,
    /// Events skipped due to a failed dependency.
    pub skipped: u64,
    /// Events never dispatched due to cancellation.
    pub cancelled: u64,
    /// Retries across all events.
    pub retries: u64,
}

impl SyncStats {
    fn record(&mut self, operation: Operation, outcome: &Outcome) {
        self.retries += outcome.retries();
        match (outcome, operation) {
            (Outcome::Applied { .. }, Operation::Create) => self.created += 1,
            (Outcome::Applied { .. }, Operation::Update) => self.updated += 1,
            (Outcome::Applied { .. }, Operation::Delete) => self.deleted += 1,
            (Outcome::Failed { .. }, _) => self.failed += 1,
            (Outcome::Skipped { .. }, _) => self.skipped += 1,
            (Outcome::Cancelled, _) => self.cancelled += 1,
        }
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Created: {}, Updated: {}, Deleted: {}, Failed: {}, Skipped: {}",
            self.created, self.updated, self.deleted, self.failed, self.skipped
        )?;
        if self.cancelled > 0 {
            write!(f, ", Cancelled: {}", self.cancelled)?;
        }
        Ok(())
    }
}

/// Result of applying a change list.
#[derive(Debug, Clone)]
pub struct SyncReport {
    events: Vec<EventReport>,
    stats: SyncStats,
    cancelled: bool,
    duration: Duration,
}

impl SyncReport {
    /// Per-event outcomes, in change-list order.
    pub fn events(&self) -> &[EventReport] {
        &self.events
    }

    /// Run counters.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Returns true if the run was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns true if every event was applied.
    pub fn is_success(&self) -> bool {
        self.events
            .iter()
            .all(|event| matches!(event.outcome, Outcome::Applied { .. }))
    }

    /// Every failed, skipped and cancelled event, in change-list order.
    pub fn errors(&self) -> ErrorSet<ChangeError> {
        self.events.iter().filter_map(EventReport::error).collect()
    }

    /// Converts the report into its stats, or the aggregated errors.
    ///
    /// A cancelled run with no failures yields [`SyncError::Cancelled`].
    pub fn into_result(self) -> SyncResult<SyncStats> {
        if self.cancelled && self.stats.failed == 0 && self.stats.skipped == 0 {
            return Err(SyncError::Cancelled);
        }
        let errors = self.errors();
        errors.into_result(self.stats).map_err(SyncError::from)
    }
}

/// Scheduling edges between the events of one change list.
#[derive(Debug)]
struct Plan {
    /// Number of unfinished prerequisites per event.
    pending: Vec<usize>,
    /// Events waiting on each event.
    dependents: Vec<BTreeSet<usize>>,
}

impl Plan {
    fn new(changes: &[Change], graph: &DependencyGraph) -> Self {
        let mut creates: HashMap<&Identity, usize> = HashMap::new();
        let mut deletes: HashMap<&Identity, usize> = HashMap::new();
        for (index, change) in changes.iter().enumerate() {
            match change.operation {
                Operation::Create => {
                    creates.insert(&change.identity, index);
                }
                Operation::Delete => {
                    deletes.insert(&change.identity, index);
                }
                Operation::Update => {}
            }
        }

        let mut dependents = vec![BTreeSet::new(); changes.len()];
        for (index, change) in changes.iter().enumerate() {
            let permitted = |link: &&Link| {
                graph.depends_on(change.kind, link.relation.parent_kind())
            };
            match change.operation {
                Operation::Create | Operation::Update => {
                    for link in change.links.iter().filter(permitted) {
                        if let Some(&parent) = creates.get(&link.parent) {
                            dependents[parent].insert(index);
                        }
                    }
                }
                Operation::Delete => {}
            }
            // Whatever held the current-side reference must let go first.
            let held = match change.operation {
                Operation::Delete => &change.links,
                Operation::Update => &change.previous_links,
                Operation::Create => continue,
            };
            for link in held.iter().filter(permitted) {
                if let Some(&parent) = deletes.get(&link.parent) {
                    dependents[index].insert(parent);
                }
            }
        }

        let mut pending = vec![0; changes.len()];
        for set in &dependents {
            for &dependent in set {
                pending[dependent] += 1;
            }
        }
        Self {
            pending,
            dependents,
        }
    }
}

/// Mutable scheduler state, guarded by one mutex.
#[derive(Debug)]
struct Schedule {
    ready: BTreeSet<usize>,
    pending: Vec<usize>,
    dependents: Vec<BTreeSet<usize>>,
    dispatched: Vec<bool>,
    outcomes: Vec<Option<Outcome>>,
    remaining: usize,
    cancelled: bool,
}

impl Schedule {
    fn new(plan: Plan) -> Self {
        let ready = plan
            .pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(index, _)| index)
            .collect();
        let len = plan.pending.len();
        Self {
            ready,
            pending: plan.pending,
            dependents: plan.dependents,
            dispatched: vec![false; len],
            outcomes: vec![None; len],
            remaining: len,
            cancelled: false,
        }
    }

    fn settle(&mut self, index: usize, outcome: Outcome) {
        if self.outcomes[index].is_none() {
            self.outcomes[index] = Some(outcome);
            self.remaining -= 1;
        }
    }

    /// Marks every undispatched event as cancelled.
    fn cancel(&mut self) {
        self.cancelled = true;
        self.ready.clear();
        for index in 0..self.outcomes.len() {
            if !self.dispatched[index] {
                self.settle(index, Outcome::Cancelled);
            }
        }
    }

    /// Records a finished event and releases or skips its dependents.
    fn complete(&mut self, index: usize, outcome: Outcome, changes: &[Change]) {
        let failed = matches!(outcome, Outcome::Failed { .. });
        self.settle(index, outcome);

        if !failed {
            for dependent in std::mem::take(&mut self.dependents[index]) {
                self.pending[dependent] -= 1;
                if self.pending[dependent] == 0 && self.outcomes[dependent].is_none() {
                    self.ready.insert(dependent);
                }
            }
            return;
        }

        let failure = describe(&changes[index]);
        let mut stack: Vec<usize> = self.dependents[index].iter().copied().collect();
        while let Some(dependent) = stack.pop() {
            if self.outcomes[dependent].is_some() {
                continue;
            }
            warn!(
                event = %describe(&changes[dependent]),
                dependency = %failure,
                "skipping event after dependency failure"
            );
            self.settle(
                dependent,
                Outcome::Skipped {
                    dependency: failure.clone(),
                },
            );
            stack.extend(self.dependents[dependent].iter().copied());
        }
    }
}

fn describe(change: &Change) -> String {
    format!("{} {} {}", change.operation, change.kind, change.label)
}

/// State shared by the workers of one run.
struct Shared<'a> {
    changes: &'a [Change],
    registry: IdRegistry,
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

/// Applies change lists to a gateway.
pub struct SyncExecutor<C: AdminClient + ?Sized> {
    client: Arc<C>,
    graph: DependencyGraph,
    config: SyncConfig,
    cancel: CancelHandle,
}

impl<C: AdminClient + ?Sized> SyncExecutor<C> {
    /// Creates an executor.
    pub fn new(client: Arc<C>, graph: DependencyGraph, config: SyncConfig) -> Self {
        Self {
            client,
            graph,
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Returns a handle that cancels runs of this executor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Applies every change, honoring dependencies, and reports per event.
    pub fn apply(&self, changes: &ChangeList) -> SyncReport {
        let started = Instant::now();
        let events = changes.changes();
        let workers = self.config.concurrency.min(events.len()).max(1);
        info!(
            events = events.len(),
            workers,
            dry_run = self.config.dry_run,
            "applying changes"
        );

        let shared = Shared {
            changes: events,
            registry: IdRegistry::new(changes),
            schedule: Mutex::new(Schedule::new(Plan::new(events, &self.graph))),
            wake: Condvar::new(),
        };

        if !events.is_empty() {
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| self.work(&shared));
                }
            });
        }

        let schedule = shared.schedule.into_inner();
        let mut stats = SyncStats::default();
        let reports: Vec<EventReport> = events
            .iter()
            .zip(schedule.outcomes)
            .map(|(change, outcome)| {
                let outcome = outcome.unwrap_or(Outcome::Cancelled);
                stats.record(change.operation, &outcome);
                EventReport {
                    operation: change.operation,
                    kind: change.kind,
                    label: change.label.clone(),
                    outcome,
                }
            })
            .collect();

        let report = SyncReport {
            events: reports,
            stats,
            cancelled: schedule.cancelled,
            duration: started.elapsed(),
        };
        info!(
            stats = %report.stats,
            retries = report.stats.retries,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync finished"
        );
        report
    }

    /// Worker loop: take a ready event, apply it, record the outcome.
    fn work(&self, shared: &Shared<'_>) {
        while let Some(index) = self.next(shared) {
            let change = &shared.changes[index];
            debug!(event = %describe(change), "dispatching");
            let outcome = self.execute(change, &shared.registry);

            let mut schedule = shared.schedule.lock();
            schedule.complete(index, outcome, shared.changes);
            shared.wake.notify_all();
        }
    }

    /// Blocks until an event is ready or nothing is left to dispatch.
    fn next(&self, shared: &Shared<'_>) -> Option<usize> {
        let mut schedule = shared.schedule.lock();
        loop {
            if self.cancel.is_cancelled() && !schedule.cancelled {
                warn!("sync cancelled, no further events will be dispatched");
                schedule.cancel();
                shared.wake.notify_all();
            }
            if let Some(index) = schedule.ready.pop_first() {
                schedule.dispatched[index] = true;
                return Some(index);
            }
            if schedule.remaining == 0 {
                return None;
            }
            let _ = shared.wake.wait_for(&mut schedule, IDLE_POLL);
        }
    }

    /// Applies one event, retrying transient failures.
    fn execute(&self, change: &Change, registry: &IdRegistry) -> Outcome {
        if self.config.dry_run {
            return Outcome::Applied {
                remote_id: change.remote_id.clone(),
                attempts: 0,
            };
        }

        let retry = &self.config.retry;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.call(change, registry) {
                Ok(remote_id) => return Outcome::Applied { remote_id, attempts },
                Err(err)
                    if err.is_retryable()
                        && attempts < retry.max_attempts
                        && !self.cancel.is_cancelled() =>
                {
                    let delay = retry.backoff(attempts);
                    warn!(
                        event = %describe(change),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => {
                    error!(event = %describe(change), attempts, error = %err, "event failed");
                    return Outcome::Failed {
                        error: err,
                        attempts,
                    };
                }
            }
        }
    }

    /// One admin API call; returns the affected record's remote ID.
    fn call(&self, change: &Change, registry: &IdRegistry) -> AdminResult<Option<String>> {
        match change.operation {
            Operation::Create => {
                let mut record = change.record.clone();
                registry.rewrite(&mut record, &change.links)?;
                let created = self.client.create(&record)?;
                let id = created
                    .id()
                    .ok_or_else(|| {
                        AdminError::Decode(format!("created {} has no id", change.label))
                    })?
                    .to_owned();
                registry.fill(&change.identity, id.clone());
                Ok(Some(id))
            }
            Operation::Update => {
                let id = change.remote_id.as_deref().ok_or_else(|| {
                    AdminError::InvalidRequest(format!("{} has no remote id", change.label))
                })?;
                let mut record = change.record.clone();
                registry.rewrite(&mut record, &change.links)?;
                record.set_id(id.to_owned());
                self.client.update(id, &record)?;
                Ok(Some(id.to_owned()))
            }
            Operation::Delete => {
                self.client.delete(&change.record)?;
                Ok(change.remote_id.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FaultBuilder, GatewayCall, MemoryGateway};
    use gatesync_core::{diff, Entity, EntityRecord, RawState, Route, Service, StateAggregate};

    fn graph() -> DependencyGraph {
        DependencyGraph::standard().unwrap()
    }

    fn desired(records: Vec<EntityRecord>) -> StateAggregate {
        let mut raw = RawState::new();
        for record in records {
            raw.push(record);
        }
        StateAggregate::build(raw, &graph()).unwrap()
    }

    fn service_and_routes() -> ChangeList {
        let state = desired(vec![
            Service::new("svc1", "a.com").into_record(),
            Route::new("r1", "svc1").into_record(),
            Route::new("r2", "svc1").into_record(),
        ]);
        diff(&StateAggregate::new(), &state, &graph()).unwrap()
    }

    #[test]
    fn plan_orders_creates_after_parents() {
        let changes = service_and_routes();
        let plan = Plan::new(changes.changes(), &graph());
        assert_eq!(plan.pending, vec![0, 1, 1]);
        assert_eq!(plan.dependents[0], BTreeSet::from([1, 2]));
    }

    #[test]
    fn applies_and_back_fills_ids() {
        let gateway = Arc::new(MemoryGateway::new());
        let executor = SyncExecutor::new(gateway.clone(), graph(), SyncConfig::new(4));
        let report = executor.apply(&service_and_routes());

        assert!(report.is_success());
        assert_eq!(report.stats().created, 3);
        assert_eq!(gateway.count(EntityKind::Route), 2);

        let Outcome::Applied {
            remote_id: Some(service_id),
            ..
        } = &report.events()[0].outcome
        else {
            panic!("service not applied");
        };
        for route in gateway.list(EntityKind::Route).unwrap() {
            assert_eq!(route.foreign_keys()[0].reference, *service_id);
        }
    }

    #[test]
    fn failure_skips_dependents() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.inject(
            FaultBuilder::new(GatewayCall::Create, AdminError::status(400, "bad"))
                .for_kind(EntityKind::Service),
        );
        let executor = SyncExecutor::new(gateway.clone(), graph(), SyncConfig::new(2));
        let report = executor.apply(&service_and_routes());

        assert_eq!(report.stats().failed, 1);
        assert_eq!(report.stats().skipped, 2);
        assert_eq!(gateway.calls(GatewayCall::Create), 1);
        assert_eq!(
            report.events()[1].outcome,
            Outcome::Skipped {
                dependency: "create service svc1".into()
            }
        );

        let errors = report.errors();
        assert_eq!(errors.len(), 3);
        assert!(errors.to_string().starts_with("3 errors occurred:"));
        assert!(matches!(
            report.into_result(),
            Err(SyncError::Changes(errors)) if errors.len() == 3
        ));
    }

    #[test]
    fn transient_errors_are_retried() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.inject(FaultBuilder::new(GatewayCall::Create, AdminError::Timeout).times(2));
        let config = SyncConfig::new(1).with_retry(
            crate::config::RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        let executor = SyncExecutor::new(gateway.clone(), graph(), config);
        let report = executor.apply(&service_and_routes());

        assert!(report.is_success());
        assert_eq!(report.stats().retries, 2);
        assert_eq!(
            report.events()[0].outcome,
            Outcome::Applied {
                remote_id: gateway.list(EntityKind::Service).unwrap()[0]
                    .id()
                    .map(str::to_owned),
                attempts: 3
            }
        );
    }

    #[test]
    fn dry_run_makes_no_calls() {
        let gateway = Arc::new(MemoryGateway::new());
        let executor = SyncExecutor::new(
            gateway.clone(),
            graph(),
            SyncConfig::default().with_dry_run(true),
        );
        let report = executor.apply(&service_and_routes());
        assert!(report.is_success());
        assert_eq!(report.stats().created, 3);
        assert_eq!(gateway.mutations(), 0);
    }

    #[test]
    fn cancelled_before_start_dispatches_nothing() {
        let gateway = Arc::new(MemoryGateway::new());
        let executor = SyncExecutor::new(gateway.clone(), graph(), SyncConfig::default());
        executor.cancel_handle().cancel();
        let report = executor.apply(&service_and_routes());

        assert!(report.was_cancelled());
        assert_eq!(report.stats().cancelled, 3);
        assert_eq!(gateway.mutations(), 0);
        assert!(matches!(report.into_result(), Err(SyncError::Cancelled)));
    }

    #[test]
    fn empty_change_list_is_a_no_op() {
        let gateway = Arc::new(MemoryGateway::new());
        let executor = SyncExecutor::new(gateway, graph(), SyncConfig::default());
        let report = executor.apply(&ChangeList::default());
        assert!(report.is_success());
        assert_eq!(report.into_result().unwrap(), SyncStats::default());
    }

    #[test]
    fn stats_display() {
        let stats = SyncStats {
            created: 2,
            deleted: 1,
            ..SyncStats::default()
        };
        assert_eq!(
            stats.to_string(),
            "Created: 2, Updated: 0, Deleted: 1, Failed: 0, Skipped: 0"
        );
    }
}
