//! Diff command implementation.

use super::{print_changes, Gateway};
use crate::error::CliResult;
use std::path::Path;

/// Runs the diff command: prints what a sync would do.
pub fn run(gateway: &Gateway, state_file: &Path) -> CliResult<()> {
    let changes = gateway.plan(state_file)?;
    print_changes(&changes);
    Ok(())
}
