//! Board geometry
//!
//! Where each column and card sits on screen. Rendering and mouse
//! hit-testing share one layout so a pointer position always maps to the
//! card that was drawn there.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::widgets::Block;

use worklog_core::{BoardItem, CardRect, Column, Hover, ItemId};

/// Rows per card, borders included
pub const CARD_HEIGHT: u16 = 3;

/// A card drawn on screen
#[derive(Debug, Clone, PartialEq)]
pub struct CardArea {
    pub id: ItemId,
    pub column: Column,
    pub area: Rect,
}

/// A column drawn on screen
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnArea {
    pub column: Column,
    /// Outer area including the border
    pub area: Rect,
    /// Area inside the border where cards go
    pub inner: Rect,
    /// Index of the first visible card
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardLayout {
    pub columns: Vec<ColumnArea>,
    pub cards: Vec<CardArea>,
}

/// Split the screen into the board and a one-line status bar
pub fn split_screen(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    (chunks[0], chunks[1])
}

/// How many whole cards fit in `inner`
pub fn visible_cards(inner: Rect) -> usize {
    usize::from(inner.height / CARD_HEIGHT)
}

impl BoardLayout {
    /// Lay out `columns` in `board`, scrolled so `selected[c]` is visible
    pub fn compute(
        board: Rect,
        columns: &[(Column, Vec<BoardItem>)],
        selected: &[usize; 4],
    ) -> Self {
        let constraints = vec![Constraint::Ratio(1, Column::ALL.len() as u32); Column::ALL.len()];
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(board);

        let mut layout = BoardLayout::default();
        for ((column, items), area) in columns.iter().zip(chunks.iter()) {
            let inner = Block::bordered().inner(*area);
            let visible = visible_cards(inner).max(1);
            let focus = selected[column.index()];
            let offset = focus.saturating_sub(visible - 1);

            for (slot, item) in items.iter().skip(offset).take(visible_cards(inner)).enumerate() {
                let top = inner.y + slot as u16 * CARD_HEIGHT;
                layout.cards.push(CardArea {
                    id: item.id,
                    column: *column,
                    area: Rect::new(inner.x, top, inner.width, CARD_HEIGHT),
                });
            }
            layout.columns.push(ColumnArea {
                column: *column,
                area: *area,
                inner,
                offset,
            });
        }
        layout
    }

    pub fn card_at(&self, x: u16, y: u16) -> Option<&CardArea> {
        self.cards.iter().find(|card| contains(card.area, x, y))
    }

    pub fn column_at(&self, x: u16, y: u16) -> Option<Column> {
        self.columns
            .iter()
            .find(|column| contains(column.area, x, y))
            .map(|column| column.column)
    }

    pub fn card(&self, id: ItemId) -> Option<&CardArea> {
        self.cards.iter().find(|card| card.id == id)
    }

    /// What the pointer is over, for drop-target resolution
    pub fn hover_at(&self, x: u16, y: u16) -> Option<Hover> {
        if let Some(card) = self.card_at(x, y) {
            return Some(Hover::Card {
                id: card.id,
                rect: CardRect::new(f64::from(card.area.y), f64::from(card.area.height)),
                pointer_y: f64::from(y),
            });
        }
        self.column_at(x, y)
            .map(|column| Hover::EmptySpace { column })
    }
}

fn contains(area: Rect, x: u16, y: u16) -> bool {
    x >= area.x && x < area.x + area.width && y >= area.y && y < area.y + area.height
}
