//! Item command handlers
//!
//! Adds, edits and notes go straight to the local store. Moves and deletes
//! go through the board controller so they follow the same optimistic
//! persist path as the terminal board, local or remote.

use anyhow::{bail, Context, Result};

use worklog_core::{
    BoardController, BoardError, Column, CommitOutcome, DropTarget, IssueProvider,
    IssueReference, ItemUpdate, NewItem, Store,
};

use super::{load_item, resolve_item_id};
use crate::editor::{confirm, edit_text};
use crate::output::{short_id, Output, OutputFormat};

/// Add an item at the end of `column`
///
/// With an issue reference the provider supplies the title (unless one is
/// given) and the canonical URL.
pub async fn add(
    store: &mut Store,
    title: Option<String>,
    column: Column,
    issue: Option<String>,
    description: Option<String>,
    provider: &dyn IssueProvider,
    output: &Output,
) -> Result<()> {
    let mut new = NewItem::new(title.unwrap_or_default(), column);
    new.description = description;

    if let Some(issue) = issue {
        let reference = IssueReference::parse(&issue)?;
        if !output.is_quiet() && !output.is_json() {
            println!("Resolving {}...", reference);
        }
        let details = provider.resolve(&reference).await;
        if new.title.trim().is_empty() {
            new.title = details.title;
        }
        new.issue_key = Some(details.key);
        new.issue_url = Some(details.url);
    }

    if new.title.trim().is_empty() {
        bail!("An item needs a title or an --issue to take one from");
    }

    let item = store.add_item(&new).context("Failed to add item")?;

    match output.format {
        OutputFormat::Human => {
            output.success(&format!(
                "Added {} to {} ({})",
                item.title,
                item.column.title(),
                short_id(&item.id)
            ));
        }
        _ => output.print_item(&item),
    }
    Ok(())
}

/// Show one item with its notes and documents
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let item = load_item(store, &id)?;
    output.print_item(&item);
    Ok(())
}

/// Edit an item's fields
///
/// A column change appends the item to the new column. With no field
/// flags the description is opened in $EDITOR.
pub fn edit(
    store: &mut Store,
    id: String,
    title: Option<String>,
    description: Option<String>,
    column: Option<Column>,
    output: &Output,
) -> Result<()> {
    let item = load_item(store, &id)?;

    let mut update = ItemUpdate {
        title,
        description,
        column,
        ..ItemUpdate::default()
    };

    if update.is_empty() {
        let hint = format!(
            "Description for: {}\nLines starting with // are ignored. Leave empty to clear.",
            item.title
        );
        let current = item.description.clone().unwrap_or_default();
        let edited = edit_text(&hint, &current).context("Failed to edit description")?;
        if edited == current {
            output.message("No changes.");
            return Ok(());
        }
        update.description = Some(edited);
    }

    let updated = store
        .update_item(item.id, &update)
        .context("Failed to update item")?;

    if output.is_json() {
        output.print_item(&updated);
    } else {
        output.success(&format!("Updated item: {}", short_id(&updated.id)));
    }
    Ok(())
}

/// Move an item to `column`, at `index` or the end
pub async fn move_item(
    controller: &BoardController,
    id: String,
    column: Column,
    index: Option<usize>,
    output: &Output,
) -> Result<()> {
    load_board(controller).await?;
    let items = controller.items();
    let item_id = resolve_item_id(&id, &items)?;

    let target = match index {
        Some(index) => DropTarget::new(column, index),
        None => DropTarget::end_of(&items, column, item_id),
    };

    let outcome = controller
        .apply_reorder(item_id, target)
        .await
        .map_err(report)?;

    match outcome {
        CommitOutcome::Unchanged => output.message("Item is already there."),
        CommitOutcome::Saved => {
            let position = controller
                .item(item_id)
                .map(|item| item.position)
                .unwrap_or(0);
            if output.is_json() {
                output.print_json(&controller.column(column));
            } else {
                output.success(&format!(
                    "Moved {} to {} (#{})",
                    short_id(&item_id),
                    column.title(),
                    position + 1
                ));
            }
        }
    }
    Ok(())
}

/// Delete an item, closing the gap in its column
pub async fn delete(
    controller: &BoardController,
    id: String,
    yes: bool,
    output: &Output,
) -> Result<()> {
    load_board(controller).await?;
    let item_id = resolve_item_id(&id, &controller.items())?;

    if output.should_prompt() && !yes {
        if let Some(item) = controller.item(item_id) {
            println!(
                "Delete item: {} - {} ({})",
                short_id(&item.id),
                item.title,
                item.column.title()
            );
            let detail_count = item.notes.len() + item.documents.len();
            if detail_count > 0 {
                println!("This also removes {} note(s)/document(s).", detail_count);
            }
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    controller.delete_item(item_id).await.map_err(report)?;

    output.success(&format!("Deleted item: {}", short_id(&item_id)));
    Ok(())
}

async fn load_board(controller: &BoardController) -> Result<()> {
    controller.load().await.map_err(report)
}

fn report(err: BoardError) -> anyhow::Error {
    tracing::debug!(error = %err, "board operation failed");
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
