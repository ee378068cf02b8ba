//! Application state and logic
//!
//! `App` never performs I/O. Key and mouse handlers change the selection
//! and the controller's working copy, and hand back an [`Action`] for the
//! event loop to run in the background.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use worklog_core::{
    BoardController, BoardError, BoardItem, Column, CommitOutcome, DragSession, DropTarget,
    IssueProvider, IssueReference, ItemId, NewItem, PendingCommit,
};

use super::layout::{split_screen, BoardLayout};

const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Input mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Normal navigation mode
    Normal,
    /// Typing a title or issue reference for a new item
    Add,
    /// Waiting for y/n before deleting the selected item
    ConfirmDelete,
}

/// Background work requested by a handler
#[derive(Debug)]
pub enum Action {
    /// Persist a move already applied to the working copy
    Persist(PendingCommit),
    Add { input: String, column: Column },
    Delete(ItemId),
    Reload,
    Open(String),
}

/// Outcome of background work, fed back into the app
#[derive(Debug)]
pub enum TaskResult {
    Saved(CommitOutcome),
    Added(BoardItem),
    Deleted(ItemId),
    Reloaded,
    Failed(BoardError),
    OpenFailed(String),
}

/// One-step keyboard moves of the selected card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Up,
    Down,
    Left,
    Right,
}

/// Application state
pub struct App {
    pub controller: BoardController,
    /// Whether the app should exit
    pub should_quit: bool,
    pub input_mode: InputMode,
    /// Text typed in add mode
    pub input: String,
    /// Cursor position in `input`, in chars
    pub cursor: usize,
    /// Column with keyboard focus
    pub focus: Column,
    /// Selected index per column
    pub selected: [usize; 4],
    /// Mouse drag in progress
    pub drag: Option<DragSession>,
    /// Geometry of the last drawn frame, for hit-testing
    pub layout: BoardLayout,
    /// Status message to display temporarily
    pub status_message: Option<String>,
    /// When the status message was set (for auto-dismiss)
    pub status_message_time: Option<Instant>,
    /// Whether help overlay is visible
    pub show_help: bool,
    /// Whether the detail overlay for the selected item is visible
    pub show_detail: bool,
    /// Advances every frame; drives the busy spinner
    pub tick: usize,
}

impl App {
    pub fn new(controller: BoardController) -> Self {
        Self {
            controller,
            should_quit: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            cursor: 0,
            focus: Column::default(),
            selected: [0; 4],
            drag: None,
            layout: BoardLayout::default(),
            status_message: None,
            status_message_time: None,
            show_help: false,
            show_detail: false,
            tick: 0,
        }
    }

    /// Set a status message (will auto-dismiss after 3 seconds)
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Check and clear expired status message
    pub fn check_status_timeout(&mut self) {
        if let Some(time) = self.status_message_time {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
                self.status_message_time = None;
            }
        }
    }

    /// Recompute card geometry for a frame of size `area`
    pub fn refresh_layout(&mut self, area: Rect) {
        let (board, _) = split_screen(area);
        self.layout = BoardLayout::compute(board, &self.controller.columns(), &self.selected);
    }

    pub fn is_busy(&self) -> bool {
        self.controller.activity().is_busy()
    }

    /// Items of the focused column in render order
    fn focused_items(&self) -> Vec<BoardItem> {
        self.controller.column(self.focus)
    }

    pub fn selected_item(&self) -> Option<BoardItem> {
        self.focused_items()
            .get(self.selected[self.focus.index()])
            .cloned()
    }

    /// Where `id` is drawn: its column and its index within that column
    ///
    /// Stored positions can have gaps (a public view hides private items),
    /// so the index is looked up rather than taken from `position`.
    fn slot_of(&self, id: ItemId) -> Option<(Column, usize)> {
        let column = self.controller.item(id)?.column;
        let index = self
            .controller
            .column(column)
            .iter()
            .position(|item| item.id == id)?;
        Some((column, index))
    }

    /// Focus and select `id` wherever it now sits
    pub fn select_item(&mut self, id: ItemId) {
        if let Some((column, index)) = self.slot_of(id) {
            self.focus = column;
            self.selected[column.index()] = index;
        }
    }

    /// Keep every selection inside its column after the board changed
    pub fn clamp_selection(&mut self) {
        for (column, items) in self.controller.columns() {
            let selected = &mut self.selected[column.index()];
            *selected = (*selected).min(items.len().saturating_sub(1));
        }
    }

    pub fn focus_left(&mut self) {
        if let Some(column) = self.focus.prev() {
            self.focus = column;
        }
    }

    pub fn focus_right(&mut self) {
        if let Some(column) = self.focus.next() {
            self.focus = column;
        }
    }

    pub fn select_up(&mut self) {
        let selected = &mut self.selected[self.focus.index()];
        *selected = selected.saturating_sub(1);
    }

    pub fn select_down(&mut self) {
        let len = self.focused_items().len();
        let selected = &mut self.selected[self.focus.index()];
        if *selected + 1 < len {
            *selected += 1;
        }
    }

    pub fn select_first(&mut self) {
        self.selected[self.focus.index()] = 0;
    }

    pub fn select_last(&mut self) {
        self.selected[self.focus.index()] = self.focused_items().len().saturating_sub(1);
    }

    /// Move the selected card one step and start persisting it
    pub fn shift_selected(&mut self, shift: Shift) -> Option<Action> {
        let item = self.selected_item()?;
        let items = self.controller.items();
        let index = self.selected[self.focus.index()];
        let len = self.focused_items().len();

        let target = match shift {
            Shift::Up if index > 0 => DropTarget::new(item.column, index - 1),
            Shift::Down if index + 1 < len => DropTarget::new(item.column, index + 1),
            Shift::Left => DropTarget::end_of(&items, item.column.prev()?, item.id),
            Shift::Right => DropTarget::end_of(&items, item.column.next()?, item.id),
            _ => return None,
        };
        self.drop_item(item.id, target)
    }

    /// Apply a drop to the working copy, returning the persist to run
    fn drop_item(&mut self, id: ItemId, target: DropTarget) -> Option<Action> {
        match self.controller.begin_reorder(id, target) {
            Ok(pending) => {
                self.select_item(id);
                pending.is_changed().then_some(Action::Persist(pending))
            }
            Err(err) => {
                self.set_status(err.user_message());
                None
            }
        }
    }

    /// Handle a key press
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        // If help is showing, any key dismisses it
        if self.show_help {
            self.show_help = false;
            return None;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Add => self.handle_add_key(key),
            InputMode::ConfirmDelete => self.handle_confirm_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Option<Action> {
        let shifted = key.modifiers.contains(KeyModifiers::SHIFT);
        if self.show_detail && !matches!(key.code, KeyCode::Char('o')) {
            self.show_detail = false;
            return None;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => {
                if self.drag.take().is_some() {
                    self.set_status("Drag cancelled");
                }
            }
            KeyCode::Char('?') => self.show_help = true,

            KeyCode::Char('H') => return self.shift_selected(Shift::Left),
            KeyCode::Char('L') => return self.shift_selected(Shift::Right),
            KeyCode::Char('K') => return self.shift_selected(Shift::Up),
            KeyCode::Char('J') => return self.shift_selected(Shift::Down),
            KeyCode::Left if shifted => return self.shift_selected(Shift::Left),
            KeyCode::Right if shifted => return self.shift_selected(Shift::Right),
            KeyCode::Up if shifted => return self.shift_selected(Shift::Up),
            KeyCode::Down if shifted => return self.shift_selected(Shift::Down),

            KeyCode::Char('h') | KeyCode::Left => self.focus_left(),
            KeyCode::Char('l') | KeyCode::Right => self.focus_right(),
            KeyCode::Tab => {
                self.focus = self.focus.next().unwrap_or(Column::ALL[0]);
            }
            KeyCode::Char('k') | KeyCode::Up => self.select_up(),
            KeyCode::Char('j') | KeyCode::Down => self.select_down(),
            KeyCode::Char('g') | KeyCode::Home => self.select_first(),
            KeyCode::Char('G') | KeyCode::End => self.select_last(),

            KeyCode::Char('a') => {
                if self.controller.may_mutate() {
                    self.input_mode = InputMode::Add;
                    self.input.clear();
                    self.cursor = 0;
                } else {
                    self.set_status(BoardError::Forbidden.user_message());
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if self.selected_item().is_some() {
                    self.input_mode = InputMode::ConfirmDelete;
                }
            }
            KeyCode::Char('r') => {
                self.set_status("Reloading...");
                return Some(Action::Reload);
            }
            KeyCode::Enter => self.show_detail = self.selected_item().is_some(),
            KeyCode::Char('o') => {
                self.show_detail = false;
                let item = self.selected_item()?;
                match item.issue_url {
                    Some(url) => return Some(Action::Open(url)),
                    None => self.set_status("No issue linked to this item"),
                }
            }
            _ => {}
        }
        None
    }

    fn handle_add_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => self.exit_input_mode(),
            KeyCode::Enter => {
                let input = self.input.trim().to_string();
                self.exit_input_mode();
                if !input.is_empty() {
                    self.set_status(format!("Adding to {}...", self.focus.title()));
                    return Some(Action::Add {
                        input,
                        column: self.focus,
                    });
                }
            }
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.cursor_left(),
            KeyCode::Right => self.cursor_right(),
            KeyCode::Char(c) => self.insert_char(c),
            _ => {}
        }
        None
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> Option<Action> {
        self.input_mode = InputMode::Normal;
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                let item = self.selected_item()?;
                Some(Action::Delete(item.id))
            }
            _ => {
                self.set_status("Delete cancelled");
                None
            }
        }
    }

    pub fn exit_input_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input.clear();
        self.cursor = 0;
    }

    /// Insert character at cursor position
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    /// Delete character before cursor
    pub fn delete_char(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_offset(self.cursor);
            self.input.remove(at);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        if self.cursor < self.input.chars().count() {
            self.cursor += 1;
        }
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map(|(offset, _)| offset)
            .unwrap_or(self.input.len())
    }

    /// Handle a mouse event against the last drawn layout
    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> Option<Action> {
        if self.input_mode != InputMode::Normal || self.show_help {
            return None;
        }
        let (x, y) = (mouse.column, mouse.row);

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.show_detail = false;
                if let Some(card) = self.layout.card_at(x, y).cloned() {
                    self.select_item(card.id);
                    if self.controller.may_mutate() {
                        self.drag = DragSession::start(&self.controller.items(), card.id);
                    }
                } else if let Some(column) = self.layout.column_at(x, y) {
                    self.focus = column;
                }
                None
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let hover = self.layout.hover_at(x, y)?;
                let items = self.controller.items();
                if let Some(session) = self.drag.as_mut() {
                    session.update(&items, hover);
                }
                None
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let session = self.drag.take()?;
                if session.is_noop() {
                    return None;
                }
                let (id, target) = session.finish();
                self.drop_item(id, target)
            }
            MouseEventKind::ScrollUp => {
                self.select_up();
                None
            }
            MouseEventKind::ScrollDown => {
                self.select_down();
                None
            }
            _ => None,
        }
    }

    /// Fold a finished background task into the app
    ///
    /// Returns a reload when the failure left the working copy stale.
    pub fn handle_result(&mut self, result: TaskResult) -> Option<Action> {
        match result {
            TaskResult::Saved(outcome) => tracing::debug!(?outcome, "move saved"),
            TaskResult::Added(item) => {
                self.select_item(item.id);
                self.set_status(format!("Added {}", item.title));
            }
            TaskResult::Deleted(id) => {
                tracing::debug!(item = %id, "delete saved");
                self.set_status("Deleted");
            }
            TaskResult::Reloaded => self.set_status("Board reloaded"),
            TaskResult::OpenFailed(message) => self.set_status(message),
            TaskResult::Failed(err) => {
                self.set_status(err.user_message());
                if err.needs_reload() {
                    self.clamp_selection();
                    return Some(Action::Reload);
                }
            }
        }
        self.clamp_selection();
        None
    }

    /// The slot a drop would land in, for the drag indicator
    ///
    /// Returns the column and the card the dragged item would be placed
    /// above; `None` for the card means the end of the column.
    pub fn drop_indicator(&self) -> Option<(Column, Option<ItemId>)> {
        let session = self.drag.as_ref()?;
        let target = session.target();
        let before = self
            .controller
            .column(target.column)
            .into_iter()
            .filter(|item| item.id != session.dragged())
            .nth(target.index)
            .map(|item| item.id);
        Some((target.column, before))
    }
}

/// Turn add-mode input into a new item
///
/// Input that parses as an issue reference is resolved through `provider`;
/// anything else becomes the title.
pub async fn item_from_input(
    input: &str,
    column: Column,
    provider: &dyn IssueProvider,
) -> NewItem {
    match IssueReference::parse(input) {
        Ok(reference) => {
            let details = provider.resolve(&reference).await;
            let mut new = NewItem::new(details.title, column);
            new.issue_key = Some(details.key);
            new.issue_url = Some(details.url);
            new
        }
        Err(_) => NewItem::new(input, column),
    }
}
