//! `bd migrate` - apply the schema migration and stamp the version.

use crate::cli::{Cli, CommandContext};
use crate::error::{BeadsError, Result};
use crate::version::{VERSION, compare_versions};

/// # Errors
///
/// `VersionMismatch` when the database was written by a newer binary;
/// storage errors opening the database or stamping the version.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;

    // Opening writably applies the idempotent migration.
    let mut store = ctx.open_store()?;
    let previous = store.get_metadata(&ctx.cancel, "bd_version")?;
    if let Some(found) = &previous {
        // Never migrate backward; a newer database stays as it is.
        if compare_versions(found, VERSION) == std::cmp::Ordering::Greater {
            return Err(BeadsError::VersionMismatch {
                expected: VERSION.to_string(),
                found: found.clone(),
            });
        }
    }
    store.set_metadata(&ctx.cancel, "bd_version", VERSION)?;

    match previous.as_deref() {
        Some(version) if version == VERSION => println!("Database already at {VERSION}."),
        Some(version) => println!("Migrated database: {version} -> {VERSION}"),
        None => println!("Stamped database version {VERSION}."),
    }
    Ok(())
}
