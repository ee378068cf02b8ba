//! UI rendering

use std::collections::HashMap;

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use worklog_core::{BoardItem, ItemId};

use super::app::{App, InputMode};
use super::layout::{split_screen, CardArea, ColumnArea};
use crate::output::{short_id, truncate};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Main UI rendering function
///
/// Draws from `app.layout`, so call [`App::refresh_layout`] for the same
/// frame first.
pub fn draw(frame: &mut Frame, app: &App) {
    let (_, status_area) = split_screen(frame.area());

    let items: HashMap<ItemId, BoardItem> = app
        .controller
        .items()
        .into_iter()
        .map(|item| (item.id, item))
        .collect();
    let indicator = app.drop_indicator();

    for column in &app.layout.columns {
        let count = items.values().filter(|item| item.column == column.column).count();
        let drop_at_end = indicator == Some((column.column, None));
        draw_column(frame, app, column, count, drop_at_end);
    }

    for card in &app.layout.cards {
        // The board may have changed since the layout was computed
        let Some(item) = items.get(&card.id) else {
            continue;
        };
        let drop_before = indicator == Some((card.column, Some(card.id)));
        draw_card(frame, app, card, item, drop_before);
    }

    draw_activity_indicator(frame, app);

    match app.input_mode {
        InputMode::Normal => draw_status_bar(frame, app, status_area),
        InputMode::Add => draw_add_input(frame, app, status_area),
        InputMode::ConfirmDelete => draw_confirm_delete(frame, app, status_area),
    }

    if app.show_detail {
        if let Some(item) = app.selected_item() {
            draw_detail_overlay(frame, &item);
        }
    }

    if app.show_help {
        draw_help_overlay(frame);
    }
}

fn draw_column(frame: &mut Frame, app: &App, column: &ColumnArea, count: usize, drop_at_end: bool) {
    let is_active = app.focus == column.column;

    let mut title = vec![Span::raw(format!(" {} ({}) ", column.column.title(), count))];
    if drop_at_end {
        title.push(Span::styled(
            "▼ drop at end ",
            Style::default().fg(Color::Yellow),
        ));
    }

    let border_style = if is_active {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let mut block = Block::default()
        .title(Line::from(title))
        .borders(Borders::ALL)
        .border_style(border_style);

    // Cards scrolled out of view above
    if column.offset > 0 {
        block = block.title_bottom(
            Line::from(format!(" ↑ {} more ", column.offset)).alignment(Alignment::Right),
        );
    }

    frame.render_widget(block, column.area);

    if count == 0 && column.inner.height > 0 {
        let hint = Paragraph::new(Span::styled(
            "empty",
            Style::default().add_modifier(Modifier::DIM),
        ))
        .alignment(Alignment::Center);
        frame.render_widget(hint, Rect::new(column.inner.x, column.inner.y, column.inner.width, 1));
    }
}

fn draw_card(frame: &mut Frame, app: &App, card: &CardArea, item: &BoardItem, drop_before: bool) {
    let is_selected = app.focus == card.column
        && app.selected_item().is_some_and(|selected| selected.id == item.id);
    let is_dragged = app
        .drag
        .as_ref()
        .is_some_and(|session| session.dragged() == item.id);

    let border_style = if drop_before {
        Style::default().fg(Color::Yellow)
    } else if is_dragged {
        Style::default().fg(Color::DarkGray)
    } else if is_selected {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    if drop_before {
        block = block.title(Span::styled("▲ drop here", Style::default().fg(Color::Yellow)));
    }
    if let Some(key) = &item.issue_key {
        block = block.title_top(Line::from(format!(" {} ", key)).alignment(Alignment::Right));
    }

    let width = usize::from(card.area.width.saturating_sub(2));
    let text_style = if is_dragged {
        Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC)
    } else if is_selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };

    let paragraph = Paragraph::new(Span::styled(truncate(&item.title, width), text_style)).block(block);
    frame.render_widget(paragraph, card.area);
}

/// Draw status bar at the bottom
fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let text = match &app.status_message {
        Some(message) => Span::raw(message.clone()),
        None if app.drag.is_some() => Span::styled(
            "Release to drop, Esc to cancel",
            Style::default().fg(Color::Yellow),
        ),
        None => Span::styled(
            "? help  a add  d delete  H/J/K/L or drag to move  r reload  q quit",
            Style::default().add_modifier(Modifier::DIM),
        ),
    };

    let mut spans = vec![text];
    if !app.controller.may_mutate() {
        spans.push(Span::styled(
            "  [read-only]",
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw add input at the bottom
fn draw_add_input(frame: &mut Frame, app: &App, area: Rect) {
    let prefix = format!("Add to {} (title or owner/repo#N): ", app.focus.title());

    let line = Line::from(vec![
        Span::styled(prefix.as_str(), Style::default().fg(Color::Yellow)),
        Span::raw(app.input.as_str()),
    ]);
    frame.render_widget(Paragraph::new(line), area);

    // Position cursor
    let cursor_x = area.x + (prefix.chars().count() + app.cursor) as u16;
    frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(1)), area.y));
}

fn draw_confirm_delete(frame: &mut Frame, app: &App, area: Rect) {
    let title = app
        .selected_item()
        .map(|item| item.title)
        .unwrap_or_default();
    let line = Line::from(vec![
        Span::styled("Delete ", Style::default().fg(Color::Red)),
        Span::styled(
            truncate(&title, 40),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled("? (y/n)", Style::default().fg(Color::Red)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Spinner in the top-right corner while a change is being saved
fn draw_activity_indicator(frame: &mut Frame, app: &App) {
    let area = frame.area();
    if area.width < 5 || !app.is_busy() {
        return;
    }

    let frame_char = SPINNER[app.tick % SPINNER.len()];
    let indicator = Paragraph::new(Span::styled(frame_char, Style::default().fg(Color::Yellow)));
    frame.render_widget(indicator, Rect::new(area.width - 2, 0, 1, 1));
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        (area.width.saturating_sub(width)) / 2,
        (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn draw_detail_overlay(frame: &mut Frame, item: &BoardItem) {
    let popup_area = centered(frame.area(), 70, 22);
    frame.render_widget(Clear, popup_area);

    let label = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let mut lines = vec![
        Line::from(Span::styled(item.title.clone(), label)),
        Line::from(""),
        Line::from(vec![
            Span::styled("Column:  ", dim),
            Span::raw(format!("{} (#{})", item.column.title(), item.position + 1)),
        ]),
        Line::from(vec![Span::styled("ID:      ", dim), Span::raw(short_id(&item.id))]),
    ];
    if let Some(key) = &item.issue_key {
        lines.push(Line::from(vec![
            Span::styled("Issue:   ", dim),
            Span::raw(key.clone()),
        ]));
    }
    if let Some(url) = &item.issue_url {
        lines.push(Line::from(vec![
            Span::styled("URL:     ", dim),
            Span::styled(url.clone(), Style::default().fg(Color::Blue)),
        ]));
    }

    if let Some(description) = item.description.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(Line::from(""));
        lines.extend(description.lines().map(|line| Line::from(line.to_string())));
    }

    if !item.documents.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Documents ({})", item.documents.len()),
            label,
        )));
        for document in &item.documents {
            lines.push(Line::from(format!("  {}  {}", document.title, document.location)));
        }
    }

    if !item.notes.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Notes ({})", item.notes.len()),
            label,
        )));
        for note in &item.notes {
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", note.created_at.format("%Y-%m-%d")), dim),
                Span::raw(note.body.lines().next().unwrap_or_default().to_string()),
            ]));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("o open issue  any key to close", dim)));

    let block = Block::default()
        .title(" Item ")
        .borders(Borders::ALL)
        .border_style(Style::default().add_modifier(Modifier::BOLD));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup_area);
}

/// Draw help overlay
fn draw_help_overlay(frame: &mut Frame) {
    let popup_area = centered(frame.area(), 54, 24);

    // Clear the popup area
    frame.render_widget(Clear, popup_area);

    let help_text = vec![
        Line::from(vec![Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  h/l, ←/→      Focus column"),
        Line::from("  j/k, ↑/↓      Select card"),
        Line::from("  g/G           First/last card"),
        Line::from("  Enter         Item details"),
        Line::from(""),
        Line::from("Moving:"),
        Line::from("  H/L           To end of previous/next column"),
        Line::from("  J/K           Down/up within the column"),
        Line::from("  mouse drag    Drop above or below a card"),
        Line::from("  Esc           Cancel a drag"),
        Line::from(""),
        Line::from("Commands:"),
        Line::from("  a             Add item (title or owner/repo#N)"),
        Line::from("  d             Delete item"),
        Line::from("  o             Open linked issue"),
        Line::from("  r             Reload board"),
        Line::from("  q             Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().add_modifier(Modifier::BOLD));

    let paragraph = Paragraph::new(help_text).block(block);
    frame.render_widget(paragraph, popup_area);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use worklog_core::{AllowAll, BoardController, Column, LocalBackend, NewItem, Store};

    async fn render(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        terminal
            .draw(|frame| {
                app.refresh_layout(frame.area());
                draw(frame, app);
            })
            .unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_board_renders_columns_and_cards() {
        let mut store = Store::open_in_memory().unwrap();
        let mut new = NewItem::new("Cache study", Column::Exploring);
        new.issue_key = Some("acme/api#7".to_string());
        store.add_item(&new).unwrap();
        let controller =
            BoardController::new(Arc::new(LocalBackend::new(store)), Arc::new(AllowAll));
        controller.load().await.unwrap();
        let mut app = App::new(controller);

        let screen = render(&mut app).await;
        assert!(screen.contains("Ideas (0)"));
        assert!(screen.contains("Exploring (1)"));
        assert!(screen.contains("Cache study"));
        assert!(screen.contains("acme/api#7"));
        assert!(screen.contains("? help"));

        app.show_help = true;
        let screen = render(&mut app).await;
        assert!(screen.contains("Keyboard Shortcuts"));
    }
}
