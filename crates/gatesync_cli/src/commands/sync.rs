//! Sync command implementation.

use super::{print_changes, AdminHttp, Gateway};
use crate::error::{CliError, CliResult};
use gatesync_core::ChangeList;
use gatesync_engine::{Outcome, SyncConfig, SyncExecutor, SyncReport};
use std::path::Path;
use tracing::warn;

/// Runs the sync command: applies the diff, reporting per-event failures.
pub fn run(gateway: &Gateway, state_file: &Path, config: SyncConfig) -> CliResult<()> {
    let changes = gateway.plan(state_file)?;
    print_changes(&changes);
    if changes.is_empty() {
        return Ok(());
    }

    let dry_run = config.dry_run;
    let executor = SyncExecutor::new(gateway.client.clone(), gateway.graph.clone(), config);
    let report = apply_interruptible(executor, changes)?;

    for event in report.events() {
        match &event.outcome {
            Outcome::Applied { .. } => {}
            Outcome::Failed { error, .. } => {
                println!("✗ {} {} {}: {error}", event.operation, event.kind, event.label);
            }
            Outcome::Skipped { dependency } => {
                println!(
                    "- {} {} {}: skipped ({dependency} failed)",
                    event.operation, event.kind, event.label
                );
            }
            Outcome::Cancelled => {}
        }
    }
    if dry_run {
        println!("Dry run, nothing was sent.");
    }
    println!("{}", report.stats());

    report.into_result()?;
    Ok(())
}

/// Applies on a blocking worker while Ctrl-C cancels the run.
///
/// Cancellation lets in-flight requests finish and reports the rest as
/// cancelled.
fn apply_interruptible(
    executor: SyncExecutor<AdminHttp>,
    changes: ChangeList,
) -> CliResult<SyncReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let cancel = executor.cancel_handle();

    runtime
        .block_on(async move {
            let mut task = tokio::task::spawn_blocking(move || executor.apply(&changes));
            tokio::select! {
                joined = &mut task => joined,
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        warn!("interrupted, waiting for in-flight requests");
                        cancel.cancel();
                    }
                    task.await
                }
            }
        })
        .map_err(|e| CliError::Runtime(e.to_string()))
}
