//! `bd version` - print version information.

use crate::error::Result;
use crate::version::{VERSION, VERSION_CHANGES};

/// # Errors
///
/// Serialization errors in JSON mode.
pub fn execute(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "version": VERSION,
                "latest_changes": VERSION_CHANGES.first().map(|change| change.summary),
            })
        );
    } else {
        println!("bd {VERSION}");
    }
    Ok(())
}
