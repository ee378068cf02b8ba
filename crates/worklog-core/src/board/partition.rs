//! Column partitioning
//!
//! Grouping by column is computed, never stored.

use crate::models::{BoardItem, Column};

/// Items of `column`, sorted ascending by position
///
/// The sort is stable and breaks ties by id, so the result does not depend
/// on input order even if the collection is not at rest.
pub fn partition(items: &[BoardItem], column: Column) -> Vec<BoardItem> {
    let mut members: Vec<BoardItem> = items
        .iter()
        .filter(|item| item.column == column)
        .cloned()
        .collect();
    members.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
    members
}

/// All columns in board order with their sorted members
pub fn columns(items: &[BoardItem]) -> Vec<(Column, Vec<BoardItem>)> {
    Column::ALL
        .iter()
        .map(|&column| (column, partition(items, column)))
        .collect()
}

/// A column whose positions are not exactly `0..n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingViolation {
    pub column: Column,
    /// Positions found, sorted ascending
    pub positions: Vec<u32>,
}

impl std::fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "column '{}' has positions {:?}, expected 0..{}",
            self.column,
            self.positions,
            self.positions.len()
        )
    }
}

/// Check that every column's positions are exactly `{0, 1, ..., n-1}`
///
/// Returns the first violating column in board order.
pub fn check_ordering(items: &[BoardItem]) -> Result<(), OrderingViolation> {
    for column in Column::ALL {
        let mut positions: Vec<u32> = items
            .iter()
            .filter(|item| item.column == column)
            .map(|item| item.position)
            .collect();
        positions.sort_unstable();
        let contiguous = positions
            .iter()
            .enumerate()
            .all(|(index, &position)| position as usize == index);
        if !contiguous {
            return Err(OrderingViolation { column, positions });
        }
    }
    Ok(())
}
