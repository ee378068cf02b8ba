//! Board command handlers

use anyhow::Result;

use worklog_core::{filter_visible, Store, Visibility};

use crate::output::Output;

/// Print every column in order
///
/// `public` renders the board the way unprivileged visitors see it.
pub fn show(store: &Store, public: bool, output: &Output) -> Result<()> {
    let snapshot = store.snapshot()?;
    let visibility = Visibility::from_privileged(!public);
    let items = filter_visible(
        &snapshot.items,
        visibility,
        &store.config().private_marker,
    );

    output.print_board(&items, &snapshot.revisions);
    Ok(())
}

/// Renumber columns whose positions have gaps or duplicates
pub fn repair(store: &mut Store, output: &Output) -> Result<()> {
    let repaired = store.repair_ordering()?;

    if output.is_json() {
        println!("{}", serde_json::json!({ "repaired": repaired }));
    } else if repaired == 0 {
        output.success("Board ordering is already consistent");
    } else {
        output.success(&format!("Renumbered {} item(s)", repaired));
    }
    Ok(())
}
