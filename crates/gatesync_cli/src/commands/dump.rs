//! Dump command implementation.

use super::Gateway;
use crate::config::{render_state, write_state};
use crate::error::CliResult;
use std::path::Path;

/// Runs the dump command: writes the gateway's state as a state file.
///
/// IDs are kept and references are IDs, so the output syncs back to the
/// same gateway with no changes.
pub fn run(gateway: &Gateway, output: Option<&Path>) -> CliResult<()> {
    let raw = gateway.current()?.to_raw();
    match output {
        Some(path) => {
            write_state(path, &raw)?;
            println!("Wrote {} entities to {}", raw.len(), path.display());
        }
        None => println!("{}", render_state(&raw)?),
    }
    Ok(())
}
