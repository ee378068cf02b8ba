//! Note command handlers
//!
//! Notes are free-form annotations owned by a board item.

use anyhow::{bail, Context, Result};

use worklog_core::{NewNote, Store};

use super::{load_item, resolve_id};
use crate::editor::{confirm, edit_text};
use crate::output::{short_id, truncate_line, Output};

/// Add a note to an item
///
/// Without `body` the note is written in $EDITOR.
pub fn add(store: &mut Store, item_id: String, body: Option<String>, output: &Output) -> Result<()> {
    let item = load_item(store, &item_id)?;

    let body = match body {
        Some(body) => body,
        None => {
            let hint = format!(
                "Adding note to: {}\nLines starting with // are ignored.",
                item.title
            );
            edit_text(&hint, "").context("Failed to edit note")?
        }
    };

    if body.trim().is_empty() {
        bail!("Note body cannot be empty");
    }

    let note = store
        .add_note(item.id, &NewNote { body })
        .context("Failed to add note to item")?;

    if output.is_json() {
        output.print_json(&note);
    } else {
        output.success(&format!(
            "Added note {} to item {}",
            short_id(&note.id),
            short_id(&item.id)
        ));
    }
    Ok(())
}

/// Delete a note from an item
pub fn delete(store: &mut Store, item_id: String, note_id: String, output: &Output) -> Result<()> {
    let item = load_item(store, &item_id)?;
    let note_uuid = resolve_id(
        &note_id,
        "note",
        item.notes.iter().map(|note| (note.id, note.body.as_str())),
    )?;

    let note = item
        .notes
        .iter()
        .find(|note| note.id == note_uuid)
        .ok_or_else(|| anyhow::anyhow!("Note not found: {}", note_id))?;

    if output.should_prompt() {
        println!(
            "Delete note: {} - {}",
            short_id(&note.id),
            truncate_line(&note.body, 50)
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .delete_note(item.id, note_uuid)
        .context("Failed to delete note")?;

    output.success(&format!("Deleted note: {}", short_id(&note_uuid)));
    Ok(())
}
