//! Drop-target resolution
//!
//! Translates the pointer position observed while dragging an item into a
//! discrete insertion point. The index is relative to the target column's
//! ordering with the dragged item removed, which is exactly what
//! [`plan_reorder`](super::plan_reorder) consumes.
//!
//! Resolution never mutates anything; it only reports intent.

use serde::{Deserialize, Serialize};

use crate::models::{BoardItem, Column, ItemId};

use super::partition::partition;

/// Where a dragged item would land if released now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropTarget {
    pub column: Column,
    /// Insertion index in the column's ordering, excluding the dragged item
    pub index: usize,
}

impl DropTarget {
    pub fn new(column: Column, index: usize) -> Self {
        Self { column, index }
    }

    /// Append to the end of `column`
    pub fn end_of(items: &[BoardItem], column: Column, dragged: ItemId) -> Self {
        let len = items
            .iter()
            .filter(|item| item.column == column && item.id != dragged)
            .count();
        Self { column, index: len }
    }

    /// The slot `dragged` currently occupies (a drop here changes nothing)
    pub fn current(items: &[BoardItem], dragged: ItemId) -> Option<Self> {
        let item = items.iter().find(|item| item.id == dragged)?;
        let index = partition(items, item.column)
            .iter()
            .position(|member| member.id == dragged)?;
        Some(Self {
            column: item.column,
            index,
        })
    }
}

/// Vertical extent of a rendered card
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardRect {
    pub top: f64,
    pub height: f64,
}

impl CardRect {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// What the pointer is over during a drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hover {
    /// Over an existing card
    Card {
        id: ItemId,
        rect: CardRect,
        pointer_y: f64,
    },
    /// Over a column but not over any card
    EmptySpace { column: Column },
}

/// Resolve a hover into a drop target for `dragged`
///
/// Over a card at sorted index `i` (dragged item excluded) the target is `i`
/// when the pointer is at or above the card's vertical midpoint and `i + 1`
/// below it. Over empty column space the target is the end of the column.
/// Hovering the dragged card itself resolves to its current slot.
///
/// Returns `None` when the hover names a card that is not on the board.
pub fn resolve_drop_target(items: &[BoardItem], dragged: ItemId, hover: Hover) -> Option<DropTarget> {
    match hover {
        Hover::EmptySpace { column } => Some(DropTarget::end_of(items, column, dragged)),
        Hover::Card { id, .. } if id == dragged => DropTarget::current(items, dragged),
        Hover::Card {
            id,
            rect,
            pointer_y,
        } => {
            let column = items.iter().find(|item| item.id == id)?.column;
            let candidates: Vec<ItemId> = partition(items, column)
                .into_iter()
                .map(|item| item.id)
                .filter(|&candidate| candidate != dragged)
                .collect();
            let i = candidates.iter().position(|&candidate| candidate == id)?;
            let index = if pointer_y <= rect.midpoint() { i } else { i + 1 };
            Some(DropTarget { column, index })
        }
    }
}

/// A drag gesture in progress
///
/// Keeps the most recently resolved target while the pointer moves; hovers
/// that resolve to nothing leave the previous target in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    dragged: ItemId,
    origin: DropTarget,
    target: DropTarget,
}

impl DragSession {
    /// Begin dragging `dragged`; `None` if it is not on the board
    pub fn start(items: &[BoardItem], dragged: ItemId) -> Option<Self> {
        let origin = DropTarget::current(items, dragged)?;
        Some(Self {
            dragged,
            origin,
            target: origin,
        })
    }

    pub fn dragged(&self) -> ItemId {
        self.dragged
    }

    pub fn origin(&self) -> DropTarget {
        self.origin
    }

    pub fn target(&self) -> DropTarget {
        self.target
    }

    /// Feed a pointer movement, returning the current target
    pub fn update(&mut self, items: &[BoardItem], hover: Hover) -> DropTarget {
        if let Some(target) = resolve_drop_target(items, self.dragged, hover) {
            self.target = target;
        }
        self.target
    }

    /// Whether releasing now would leave the item where it started
    pub fn is_noop(&self) -> bool {
        self.target == self.origin
    }

    /// End the gesture, yielding what to commit
    pub fn finish(self) -> (ItemId, DropTarget) {
        (self.dragged, self.target)
    }
}
