//! Reorder planning
//!
//! Computes the effect of dropping an item at a [`DropTarget`]: the full
//! optimistic collection and the batch of placements to persist. Both the
//! target column and (on a cross-column move) the source column are
//! renumbered to `0..n`.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{BoardItem, Column, ItemId, Placement};

use super::drop_target::DropTarget;
use super::partition::partition;

/// Errors from reorder planning
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Item {0} is not on the board")]
    UnknownItem(ItemId),
}

/// Outcome of planning a drop
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan {
    /// The whole collection with the drop applied
    pub items: Vec<BoardItem>,
    /// Every `(id, column, position)` of the renumbered column(s)
    pub placements: Vec<Placement>,
    /// False when the drop leaves every item where it was
    pub changed: bool,
}

/// Plan moving `dragged` to `target`
///
/// `target.index` is clamped to the length of the target column (dragged
/// item excluded). Items outside the affected columns are returned as-is.
pub fn plan_reorder(
    items: &[BoardItem],
    dragged: ItemId,
    target: DropTarget,
) -> Result<ReorderPlan, PlanError> {
    let source = items
        .iter()
        .find(|item| item.id == dragged)
        .map(|item| item.column)
        .ok_or(PlanError::UnknownItem(dragged))?;

    let mut target_order: Vec<ItemId> = partition(items, target.column)
        .into_iter()
        .map(|item| item.id)
        .filter(|&id| id != dragged)
        .collect();
    let index = target.index.min(target_order.len());
    target_order.insert(index, dragged);

    let mut placements = renumber(&target_order, target.column);
    if source != target.column {
        let source_order: Vec<ItemId> = partition(items, source)
            .into_iter()
            .map(|item| item.id)
            .filter(|&id| id != dragged)
            .collect();
        placements.extend(renumber(&source_order, source));
    }

    let by_id: HashMap<ItemId, Placement> =
        placements.iter().map(|placement| (placement.id, *placement)).collect();

    let mut changed = false;
    let planned = items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if let Some(placement) = by_id.get(&item.id) {
                if item.column != placement.column || item.position != placement.position {
                    changed = true;
                    item.column = placement.column;
                    item.position = placement.position;
                }
            }
            item
        })
        .collect();

    tracing::debug!(
        item = %dragged,
        from = %source,
        to = %target.column,
        index,
        changed,
        "planned reorder"
    );

    Ok(ReorderPlan {
        items: planned,
        placements,
        changed,
    })
}

fn renumber(order: &[ItemId], column: Column) -> Vec<Placement> {
    order
        .iter()
        .enumerate()
        .map(|(position, &id)| Placement {
            id,
            column,
            position: position as u32,
        })
        .collect()
}
