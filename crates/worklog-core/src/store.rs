//! Item store
//!
//! The `Store` owns the persisted board: items with their column and
//! position, plus the notes and documents attached to them.
//!
//! Every mutation runs in one `IMMEDIATE` SQLite transaction, so a reader
//! (another tab, the public view, a second process sharing the database
//! file) only ever sees a column at rest with positions `0..n`.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! let item = store.add_item(&NewItem::new("Investigate caching", Column::Ideas))?;
//! let snapshot = store.snapshot()?;
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    BatchReorder, BoardItem, BoardSnapshot, Column, ColumnRevisions, ItemDocument, ItemId,
    ItemNote, ItemUpdate, MutationReceipt, NewDocument, NewItem, NewNote, Placement,
};
use crate::storage::schema::{init_schema, needs_init};
use crate::storage::{StorageError, StorageResult};

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "id, board_column, position, title, description, issue_key, issue_url, created_at, updated_at";

/// SQLite-backed board storage
pub struct Store {
    conn: Connection,
    config: Config,
}

impl Store {
    /// Open the store at the configured location
    pub fn open() -> anyhow::Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config).context("Failed to open item store")
    }

    /// Open the store with a specific configuration
    ///
    /// Creates the data directory and schema on first run and repairs any
    /// column whose positions are not contiguous.
    pub fn open_with_config(config: Config) -> StorageResult<Self> {
        let path = config.sqlite_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened item store");

        Self::from_connection(conn, config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, Config::default())
    }

    fn from_connection(conn: Connection, config: Config) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        let mut store = Self { conn, config };
        let repaired = store.repair_ordering()?;
        if repaired > 0 {
            tracing::warn!(rows = repaired, "repaired out-of-order positions");
        }
        Ok(store)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Reads ====================

    /// Load every item with its notes and documents, plus current revisions
    ///
    /// Items come back grouped by column in board order, each column sorted
    /// by position.
    pub fn snapshot(&self) -> StorageResult<BoardSnapshot> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM board_items", ITEM_COLUMNS))?;
        let rows = stmt
            .query_map([], ItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut notes = load_all_notes(&self.conn)?;
        let mut documents = load_all_documents(&self.conn)?;

        let mut items = rows
            .into_iter()
            .map(|row| {
                let id = row.parse_id()?;
                let item_notes = notes.remove(&id).unwrap_or_default();
                let item_documents = documents.remove(&id).unwrap_or_default();
                row.into_item(item_notes, item_documents)
            })
            .collect::<StorageResult<Vec<_>>>()?;
        items.sort_by(|a, b| {
            (a.column, a.position, a.id).cmp(&(b.column, b.position, b.id))
        });

        Ok(BoardSnapshot {
            items,
            revisions: load_revisions(&self.conn)?,
            read_only: false,
        })
    }

    /// Get an item by ID (includes notes and documents)
    pub fn get_item(&self, id: ItemId) -> StorageResult<Option<BoardItem>> {
        load_item(&self.conn, id)
    }

    /// Number of items on the board
    pub fn item_count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM board_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Current per-column revisions
    pub fn revisions(&self) -> StorageResult<ColumnRevisions> {
        load_revisions(&self.conn)
    }

    // ==================== Item mutations ====================

    /// Add an item at the end of its column
    pub fn add_item(&mut self, new: &NewItem) -> StorageResult<BoardItem> {
        let title = required_text("title", &new.title)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let position = next_position(&tx, new.column)?;

        let mut item = BoardItem::new(title, new.column);
        item.position = position;
        item.created_at = stored_now();
        item.updated_at = item.created_at;
        item.description = optional_text(new.description.as_deref());
        item.issue_key = optional_text(new.issue_key.as_deref());
        item.issue_url = optional_text(new.issue_url.as_deref());

        tx.execute(
            &format!(
                "INSERT INTO board_items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ITEM_COLUMNS
            ),
            params![
                item.id.to_string(),
                item.column.as_str(),
                item.position,
                item.title,
                item.description,
                item.issue_key,
                item.issue_url,
                item.created_at.timestamp_millis(),
                item.updated_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;

        tracing::info!(item = %item.id, column = %item.column, position, "added item");
        Ok(item)
    }

    /// Edit an item's fields
    ///
    /// A column change appends the item to the end of the new column and
    /// closes the gap it leaves behind; both columns' revisions are bumped.
    pub fn update_item(&mut self, id: ItemId, update: &ItemUpdate) -> StorageResult<BoardItem> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut item = load_item(&tx, id)?.ok_or(StorageError::UnknownItem { id })?;

        if let Some(title) = update.title.as_deref() {
            item.title = required_text("title", title)?;
        }
        if let Some(description) = update.description.as_deref() {
            item.description = optional_text(Some(description));
        }
        if let Some(issue_key) = update.issue_key.as_deref() {
            item.issue_key = optional_text(Some(issue_key));
        }
        if let Some(issue_url) = update.issue_url.as_deref() {
            item.issue_url = optional_text(Some(issue_url));
        }

        if let Some(column) = update.column.filter(|&column| column != item.column) {
            let (from, from_position) = (item.column, item.position);
            item.position = next_position(&tx, column)?;
            item.column = column;
            close_gap(&tx, from, from_position)?;
            bump_revision(&tx, from)?;
            bump_revision(&tx, column)?;
            tracing::info!(item = %id, from = %from, to = %column, "moved item to column end");
        }

        item.updated_at = stored_now();
        tx.execute(
            "UPDATE board_items
             SET board_column = ?, position = ?, title = ?, description = ?,
                 issue_key = ?, issue_url = ?, updated_at = ?
             WHERE id = ?",
            params![
                item.column.as_str(),
                item.position,
                item.title,
                item.description,
                item.issue_key,
                item.issue_url,
                item.updated_at.timestamp_millis(),
                id.to_string(),
            ],
        )?;
        tx.commit()?;

        Ok(item)
    }

    /// Delete an item with its notes and documents
    ///
    /// The former column is renumbered in the same transaction. When
    /// `expected_revision` is given and the column has moved past it, nothing
    /// is deleted and a [`StorageError::RevisionConflict`] is returned.
    pub fn delete_item(
        &mut self,
        id: ItemId,
        expected_revision: Option<u64>,
    ) -> StorageResult<MutationReceipt> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (column, position) =
            load_placement(&tx, id)?.ok_or(StorageError::UnknownItem { id })?;

        if let Some(expected) = expected_revision {
            let actual = load_revisions(&tx)?.get(&column).copied().unwrap_or(0);
            if actual != expected {
                tracing::warn!(item = %id, %column, expected, actual, "rejected stale delete");
                return Err(StorageError::RevisionConflict {
                    column,
                    expected,
                    actual,
                });
            }
        }

        tx.execute("DELETE FROM board_items WHERE id = ?", params![id.to_string()])?;
        close_gap(&tx, column, position)?;
        bump_revision(&tx, column)?;
        let revisions = load_revisions(&tx)?;
        tx.commit()?;

        tracing::info!(item = %id, column = %column, "deleted item");
        Ok(MutationReceipt { revisions })
    }

    /// Apply a batch of placements atomically
    ///
    /// The whole batch is rejected, with nothing written, when:
    /// - an item appears twice or does not exist
    /// - an expected revision is stale
    /// - a column touched by the batch would not end up at `0..n`
    ///
    /// Rows whose column and position already match are not rewritten, and
    /// a column is only bumped when one of its rows actually changed.
    pub fn apply_batch(&mut self, batch: &BatchReorder) -> StorageResult<MutationReceipt> {
        let mut seen = HashSet::new();
        for placement in &batch.placements {
            if !seen.insert(placement.id) {
                return Err(StorageError::DuplicatePlacement { id: placement.id });
            }
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_revisions = load_revisions(&tx)?;
        for (&column, &expected) in &batch.expected_revisions {
            let actual = current_revisions.get(&column).copied().unwrap_or(0);
            if actual != expected {
                tracing::warn!(%column, expected, actual, "rejected stale reorder batch");
                return Err(StorageError::RevisionConflict {
                    column,
                    expected,
                    actual,
                });
            }
        }

        let current = load_all_placements(&tx)?;
        for placement in &batch.placements {
            if !current.contains_key(&placement.id) {
                return Err(StorageError::UnknownItem { id: placement.id });
            }
        }

        validate_post_state(&current, &batch.placements)?;

        let now = Utc::now().timestamp_millis();
        let mut changed_columns = BTreeSet::new();
        for placement in &batch.placements {
            let before = current[&placement.id];
            if before == (placement.column, placement.position) {
                continue;
            }
            tx.execute(
                "UPDATE board_items SET board_column = ?, position = ?, updated_at = ? WHERE id = ?",
                params![
                    placement.column.as_str(),
                    placement.position,
                    now,
                    placement.id.to_string(),
                ],
            )?;
            changed_columns.insert(before.0);
            changed_columns.insert(placement.column);
        }
        for &column in &changed_columns {
            bump_revision(&tx, column)?;
        }

        let revisions = load_revisions(&tx)?;
        tx.commit()?;

        tracing::debug!(
            placements = batch.placements.len(),
            columns = ?changed_columns,
            "applied reorder batch"
        );
        Ok(MutationReceipt { revisions })
    }

    /// Renumber every column to `0..n`
    ///
    /// Order is kept by `(position, created_at, id)`. Returns the number of
    /// rows whose position changed.
    pub fn repair_ordering(&mut self) -> StorageResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut repaired = 0;

        for column in Column::ALL {
            let rows: Vec<(String, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, position FROM board_items WHERE board_column = ?
                     ORDER BY position, created_at, id",
                )?;
                let rows = stmt
                    .query_map(params![column.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut column_changed = false;
            for (index, (id, position)) in rows.iter().enumerate() {
                if *position != index as i64 {
                    tx.execute(
                        "UPDATE board_items SET position = ? WHERE id = ?",
                        params![index as i64, id],
                    )?;
                    repaired += 1;
                    column_changed = true;
                }
            }
            if column_changed {
                bump_revision(&tx, column)?;
            }
        }

        tx.commit()?;
        Ok(repaired)
    }

    // ==================== Notes ====================

    /// Attach a note to an item
    pub fn add_note(&mut self, item_id: ItemId, new: &NewNote) -> StorageResult<ItemNote> {
        let body = required_text("note body", &new.body)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_item(&tx, item_id)?;

        let mut note = ItemNote::new(body);
        note.created_at = stored_now();
        tx.execute(
            "INSERT INTO item_notes (id, item_id, body, created_at) VALUES (?, ?, ?, ?)",
            params![
                note.id.to_string(),
                item_id.to_string(),
                note.body,
                note.created_at.timestamp_millis(),
            ],
        )?;
        touch_item(&tx, item_id)?;
        tx.commit()?;

        Ok(note)
    }

    /// Remove a note from an item
    pub fn delete_note(&mut self, item_id: ItemId, note_id: Uuid) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_item(&tx, item_id)?;

        let deleted = tx.execute(
            "DELETE FROM item_notes WHERE id = ? AND item_id = ?",
            params![note_id.to_string(), item_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(StorageError::UnknownNote { item_id, note_id });
        }
        touch_item(&tx, item_id)?;
        tx.commit()?;

        Ok(())
    }

    // ==================== Documents ====================

    /// Attach a document reference to an item
    pub fn add_document(
        &mut self,
        item_id: ItemId,
        new: &NewDocument,
    ) -> StorageResult<ItemDocument> {
        let title = required_text("document title", &new.title)?;
        let location = required_text("document location", &new.location)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_item(&tx, item_id)?;

        let mut document = ItemDocument::new(title, location);
        document.created_at = stored_now();
        tx.execute(
            "INSERT INTO item_documents (id, item_id, title, location, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                document.id.to_string(),
                item_id.to_string(),
                document.title,
                document.location,
                document.created_at.timestamp_millis(),
            ],
        )?;
        touch_item(&tx, item_id)?;
        tx.commit()?;

        Ok(document)
    }

    /// Remove a document reference from an item
    pub fn delete_document(&mut self, item_id: ItemId, document_id: Uuid) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_item(&tx, item_id)?;

        let deleted = tx.execute(
            "DELETE FROM item_documents WHERE id = ? AND item_id = ?",
            params![document_id.to_string(), item_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(StorageError::UnknownDocument {
                item_id,
                document_id,
            });
        }
        touch_item(&tx, item_id)?;
        tx.commit()?;

        Ok(())
    }
}

// ==================== Validation ====================

/// Check that every column the batch touches ends up at `0..n`
fn validate_post_state(
    current: &HashMap<ItemId, (Column, u32)>,
    placements: &[Placement],
) -> StorageResult<()> {
    let mut after = current.clone();
    let mut touched = BTreeSet::new();
    let listed: HashSet<ItemId> = placements.iter().map(|p| p.id).collect();

    for placement in placements {
        if let Some((column, _)) = current.get(&placement.id) {
            touched.insert(*column);
        }
        touched.insert(placement.column);
        after.insert(placement.id, (placement.column, placement.position));
    }

    for column in touched {
        let members: Vec<(ItemId, u32)> = after
            .iter()
            .filter(|(_, (c, _))| *c == column)
            .map(|(id, (_, position))| (*id, *position))
            .collect();
        let mut positions: Vec<u32> = members.iter().map(|(_, p)| *p).collect();
        positions.sort_unstable();

        let contiguous = positions
            .iter()
            .enumerate()
            .all(|(index, &position)| position as usize == index);
        if contiguous {
            continue;
        }

        if members.iter().any(|(id, _)| !listed.contains(id)) {
            tracing::warn!(%column, "reorder batch does not cover the whole column");
            return Err(StorageError::StaleColumn { column });
        }
        return Err(StorageError::InvalidOrdering {
            column,
            details: format!("positions {:?}, expected 0..{}", positions, positions.len()),
        });
    }

    Ok(())
}

fn required_text(field: &str, value: &str) -> StorageResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StorageError::Invalid(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trimmed text, with blank meaning "no value"
fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ==================== Transaction helpers ====================

fn next_position(conn: &Connection, column: Column) -> StorageResult<u32> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM board_items WHERE board_column = ?",
        params![column.as_str()],
        |row| row.get(0),
    )?;
    to_position(next)
}

/// Shift everything after a removed slot up by one
fn close_gap(conn: &Connection, column: Column, removed: u32) -> StorageResult<()> {
    conn.execute(
        "UPDATE board_items SET position = position - 1 WHERE board_column = ? AND position > ?",
        params![column.as_str(), removed],
    )?;
    Ok(())
}

fn bump_revision(conn: &Connection, column: Column) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO column_revisions (board_column, revision) VALUES (?, 1)
         ON CONFLICT(board_column) DO UPDATE SET revision = revision + 1",
        params![column.as_str()],
    )?;
    Ok(())
}

fn ensure_item(conn: &Connection, id: ItemId) -> StorageResult<()> {
    load_placement(conn, id)?
        .map(|_| ())
        .ok_or(StorageError::UnknownItem { id })
}

fn touch_item(conn: &Connection, id: ItemId) -> StorageResult<()> {
    conn.execute(
        "UPDATE board_items SET updated_at = ? WHERE id = ?",
        params![Utc::now().timestamp_millis(), id.to_string()],
    )?;
    Ok(())
}

fn load_revisions(conn: &Connection) -> StorageResult<ColumnRevisions> {
    let mut stmt = conn.prepare("SELECT board_column, revision FROM column_revisions")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(column, revision)| Ok((parse_column("column_revisions", &column)?, revision as u64)))
        .collect()
}

fn load_placement(conn: &Connection, id: ItemId) -> StorageResult<Option<(Column, u32)>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT board_column, position FROM board_items WHERE id = ?",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((column, position)) => Ok(Some((
            parse_column("board_items", &column)?,
            to_position(position)?,
        ))),
        None => Ok(None),
    }
}

fn load_all_placements(conn: &Connection) -> StorageResult<HashMap<ItemId, (Column, u32)>> {
    let mut stmt = conn.prepare("SELECT id, board_column, position FROM board_items")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, column, position)| {
            Ok((
                parse_uuid("board_items", &id)?,
                (parse_column("board_items", &column)?, to_position(position)?),
            ))
        })
        .collect()
}

fn load_item(conn: &Connection, id: ItemId) -> StorageResult<Option<BoardItem>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM board_items WHERE id = ?", ITEM_COLUMNS),
            params![id.to_string()],
            ItemRow::from_row,
        )
        .optional()?;

    match row {
        Some(row) => {
            let notes = load_all_notes_for(conn, id)?;
            let documents = load_all_documents_for(conn, id)?;
            Ok(Some(row.into_item(notes, documents)?))
        }
        None => Ok(None),
    }
}

fn load_all_notes(conn: &Connection) -> StorageResult<HashMap<ItemId, Vec<ItemNote>>> {
    let mut stmt =
        conn.prepare("SELECT item_id, id, body, created_at FROM item_notes ORDER BY created_at, id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut notes: HashMap<ItemId, Vec<ItemNote>> = HashMap::new();
    for (item_id, id, body, created_at) in rows {
        notes
            .entry(parse_uuid("item_notes", &item_id)?)
            .or_default()
            .push(ItemNote {
                id: parse_uuid("item_notes", &id)?,
                body,
                created_at: from_millis(created_at),
            });
    }
    Ok(notes)
}

fn load_all_notes_for(conn: &Connection, item_id: ItemId) -> StorageResult<Vec<ItemNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, body, created_at FROM item_notes WHERE item_id = ? ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![item_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, body, created_at)| {
            Ok(ItemNote {
                id: parse_uuid("item_notes", &id)?,
                body,
                created_at: from_millis(created_at),
            })
        })
        .collect()
}

fn load_all_documents(conn: &Connection) -> StorageResult<HashMap<ItemId, Vec<ItemDocument>>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, id, title, location, created_at FROM item_documents ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut documents: HashMap<ItemId, Vec<ItemDocument>> = HashMap::new();
    for (item_id, id, title, location, created_at) in rows {
        documents
            .entry(parse_uuid("item_documents", &item_id)?)
            .or_default()
            .push(ItemDocument {
                id: parse_uuid("item_documents", &id)?,
                title,
                location,
                created_at: from_millis(created_at),
            });
    }
    Ok(documents)
}

fn load_all_documents_for(conn: &Connection, item_id: ItemId) -> StorageResult<Vec<ItemDocument>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, location, created_at FROM item_documents
         WHERE item_id = ? ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![item_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, title, location, created_at)| {
            Ok(ItemDocument {
                id: parse_uuid("item_documents", &id)?,
                title,
                location,
                created_at: from_millis(created_at),
            })
        })
        .collect()
}

// ==================== Row decoding ====================

struct ItemRow {
    id: String,
    column: String,
    position: i64,
    title: String,
    description: Option<String>,
    issue_key: Option<String>,
    issue_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            column: row.get(1)?,
            position: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            issue_key: row.get(5)?,
            issue_url: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn parse_id(&self) -> StorageResult<ItemId> {
        parse_uuid("board_items", &self.id)
    }

    fn into_item(
        self,
        notes: Vec<ItemNote>,
        documents: Vec<ItemDocument>,
    ) -> StorageResult<BoardItem> {
        Ok(BoardItem {
            id: self.parse_id()?,
            column: parse_column("board_items", &self.column)?,
            position: to_position(self.position)?,
            title: self.title,
            description: self.description,
            issue_key: self.issue_key,
            issue_url: self.issue_url,
            notes,
            documents,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

fn parse_uuid(table: &'static str, value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::CorruptRow {
        table,
        details: format!("invalid UUID '{}': {}", value, e),
    })
}

fn parse_column(table: &'static str, value: &str) -> StorageResult<Column> {
    value.parse().map_err(|e| StorageError::CorruptRow {
        table,
        details: format!("{}", e),
    })
}

fn to_position(value: i64) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| StorageError::CorruptRow {
        table: "board_items",
        details: format!("position {} out of range", value),
    })
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// Current time at the precision rows are stored with
fn stored_now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{check_ordering, partition, plan_reorder, DropTarget};
    use tempfile::TempDir;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn add(store: &mut Store, title: &str, column: Column) -> BoardItem {
        store.add_item(&NewItem::new(title, column)).unwrap()
    }

    fn titles(store: &Store, column: Column) -> Vec<(String, u32)> {
        let snapshot = store.snapshot().unwrap();
        partition(&snapshot.items, column)
            .into_iter()
            .map(|item| (item.title, item.position))
            .collect()
    }

    fn pair(title: &str, position: u32) -> (String, u32) {
        (title.to_string(), position)
    }

    #[test]
    fn test_open_creates_database() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().join("data"),
            ..Config::default()
        };

        let mut store = Store::open_with_config(config.clone()).unwrap();
        add(&mut store, "persisted", Column::Ideas);
        drop(store);

        assert!(config.sqlite_path().exists());
        let reopened = Store::open_with_config(config).unwrap();
        assert_eq!(reopened.item_count().unwrap(), 1);
    }

    #[test]
    fn test_add_appends_to_column() {
        let mut store = store();
        assert_eq!(add(&mut store, "a", Column::Ideas).position, 0);
        assert_eq!(add(&mut store, "b", Column::Ideas).position, 1);
        assert_eq!(add(&mut store, "x", Column::Closed).position, 0);
        assert_eq!(add(&mut store, "c", Column::Ideas).position, 2);

        assert_eq!(
            titles(&store, Column::Ideas),
            vec![pair("a", 0), pair("b", 1), pair("c", 2)]
        );
    }

    #[test]
    fn test_added_item_matches_snapshot() {
        let mut store = store();
        let mut new = NewItem::new("  Caching  ", Column::Discussing);
        new.issue_key = Some("acme/research#7".to_string());
        new.description = Some("   ".to_string());
        let item = store.add_item(&new).unwrap();

        assert_eq!(item.title, "Caching");
        assert!(item.description.is_none());
        assert_eq!(store.snapshot().unwrap().items, vec![item]);
    }

    #[test]
    fn test_add_rejects_blank_title() {
        let mut store = store();
        let err = store.add_item(&NewItem::new("   ", Column::Ideas)).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.item_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_closes_gap() {
        let mut store = store();
        add(&mut store, "A", Column::Exploring);
        let b = add(&mut store, "B", Column::Exploring);
        add(&mut store, "C", Column::Exploring);

        let receipt = store.delete_item(b.id, None).unwrap();

        assert_eq!(
            titles(&store, Column::Exploring),
            vec![pair("A", 0), pair("C", 1)]
        );
        assert_eq!(receipt.revisions.get(&Column::Exploring), Some(&1));
        assert!(store.get_item(b.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_unknown_item() {
        let mut store = store();
        let id = Uuid::new_v4();
        let err = store.delete_item(id, None).unwrap_err();
        assert!(matches!(err, StorageError::UnknownItem { id: missing } if missing == id));
    }

    #[test]
    fn test_delete_with_stale_revision_is_rejected() {
        let mut store = store();
        let a = add(&mut store, "A", Column::Ideas);
        let b = add(&mut store, "B", Column::Ideas);
        let c = add(&mut store, "C", Column::Ideas);

        // Someone else moves C to the top: ideas is now at revision 1
        let snapshot = store.snapshot().unwrap();
        let plan = plan_reorder(&snapshot.items, c.id, DropTarget::new(Column::Ideas, 0)).unwrap();
        store.apply_batch(&BatchReorder::new(plan.placements)).unwrap();

        let err = store.delete_item(b.id, Some(0)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::RevisionConflict { column: Column::Ideas, expected: 0, actual: 1 }
        ));
        assert!(err.is_conflict());
        assert_eq!(
            titles(&store, Column::Ideas),
            vec![pair("C", 0), pair("A", 1), pair("B", 2)]
        );

        let receipt = store.delete_item(b.id, Some(1)).unwrap();
        assert_eq!(receipt.revisions.get(&Column::Ideas), Some(&2));
        assert!(store.get_item(a.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_cascades_notes_and_documents() {
        let mut store = store();
        let item = add(&mut store, "with children", Column::Ideas);
        store
            .add_note(item.id, &NewNote { body: "first".to_string() })
            .unwrap();
        store
            .add_document(
                item.id,
                &NewDocument {
                    title: "design".to_string(),
                    location: "https://example.com/design".to_string(),
                },
            )
            .unwrap();

        store.delete_item(item.id, None).unwrap();

        let notes: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM item_notes", [], |row| row.get(0))
            .unwrap();
        let documents: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM item_documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(notes, 0);
        assert_eq!(documents, 0);
    }

    #[test]
    fn test_update_fields() {
        let mut store = store();
        let item = add(&mut store, "draft", Column::Ideas);

        let updated = store
            .update_item(
                item.id,
                &ItemUpdate {
                    title: Some("final".to_string()),
                    issue_key: Some("acme/research#4".to_string()),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(updated.issue_key.as_deref(), Some("acme/research#4"));

        // Empty string clears
        let cleared = store
            .update_item(
                item.id,
                &ItemUpdate {
                    issue_key: Some(String::new()),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        assert!(cleared.issue_key.is_none());
        assert!(store.revisions().unwrap().is_empty());
    }

    #[test]
    fn test_update_column_appends_and_closes_gap() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        add(&mut store, "b", Column::Ideas);
        add(&mut store, "z", Column::Discussing);

        let moved = store
            .update_item(
                a.id,
                &ItemUpdate {
                    column: Some(Column::Discussing),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(moved.column, Column::Discussing);
        assert_eq!(moved.position, 1);
        assert_eq!(titles(&store, Column::Ideas), vec![pair("b", 0)]);
        let revisions = store.revisions().unwrap();
        assert_eq!(revisions.get(&Column::Ideas), Some(&1));
        assert_eq!(revisions.get(&Column::Discussing), Some(&1));
    }

    #[test]
    fn test_apply_batch_cross_column() {
        let mut store = store();
        let x = add(&mut store, "X", Column::Ideas);
        add(&mut store, "Y", Column::Ideas);
        add(&mut store, "Z", Column::Exploring);

        let snapshot = store.snapshot().unwrap();
        let plan = plan_reorder(&snapshot.items, x.id, DropTarget::new(Column::Exploring, 1)).unwrap();
        let receipt = store.apply_batch(&BatchReorder::new(plan.placements)).unwrap();

        assert_eq!(titles(&store, Column::Ideas), vec![pair("Y", 0)]);
        assert_eq!(
            titles(&store, Column::Exploring),
            vec![pair("Z", 0), pair("X", 1)]
        );
        assert_eq!(receipt.revisions.get(&Column::Ideas), Some(&1));
        assert_eq!(receipt.revisions.get(&Column::Exploring), Some(&1));
    }

    #[test]
    fn test_apply_batch_rejects_unknown_id_atomically() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let b = add(&mut store, "b", Column::Ideas);
        let before = store.snapshot().unwrap();

        let ghost = Uuid::new_v4();
        let batch = BatchReorder::new(vec![
            Placement { id: b.id, column: Column::Ideas, position: 0 },
            Placement { id: a.id, column: Column::Ideas, position: 1 },
            Placement { id: ghost, column: Column::Ideas, position: 2 },
        ]);
        let err = store.apply_batch(&batch).unwrap_err();

        assert!(matches!(err, StorageError::UnknownItem { id } if id == ghost));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_apply_batch_rejects_duplicates() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let batch = BatchReorder::new(vec![
            Placement { id: a.id, column: Column::Ideas, position: 0 },
            Placement { id: a.id, column: Column::Closed, position: 0 },
        ]);
        let err = store.apply_batch(&batch).unwrap_err();
        assert!(matches!(err, StorageError::DuplicatePlacement { .. }));
    }

    #[test]
    fn test_apply_batch_rejects_gaps() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let b = add(&mut store, "b", Column::Ideas);
        let before = store.snapshot().unwrap();

        let batch = BatchReorder::new(vec![
            Placement { id: a.id, column: Column::Ideas, position: 0 },
            Placement { id: b.id, column: Column::Ideas, position: 2 },
        ]);
        let err = store.apply_batch(&batch).unwrap_err();

        assert!(matches!(err, StorageError::InvalidOrdering { column: Column::Ideas, .. }));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_apply_batch_detects_revision_conflict() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let b = add(&mut store, "b", Column::Ideas);
        let loaded = store.snapshot().unwrap();

        // Someone else reorders first
        let mut first = BatchReorder::new(vec![
            Placement { id: b.id, column: Column::Ideas, position: 0 },
            Placement { id: a.id, column: Column::Ideas, position: 1 },
        ]);
        first.expected_revisions = loaded.revisions.clone();
        store.apply_batch(&first).unwrap();

        // A batch planned against the old snapshot is refused
        let mut second = BatchReorder::new(vec![
            Placement { id: a.id, column: Column::Ideas, position: 0 },
            Placement { id: b.id, column: Column::Ideas, position: 1 },
        ]);
        second.expected_revisions.insert(Column::Ideas, 0);
        let err = store.apply_batch(&second).unwrap_err();

        assert!(err.is_conflict());
        assert!(matches!(
            err,
            StorageError::RevisionConflict { column: Column::Ideas, expected: 0, actual: 1 }
        ));
        assert_eq!(titles(&store, Column::Ideas), vec![pair("b", 0), pair("a", 1)]);
    }

    #[test]
    fn test_apply_batch_missing_concurrent_add_is_stale() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let x = add(&mut store, "x", Column::Closed);
        let loaded = store.snapshot().unwrap();

        // Appended after the client loaded the board
        add(&mut store, "late", Column::Ideas);

        let plan = plan_reorder(&loaded.items, x.id, DropTarget::new(Column::Ideas, 1)).unwrap();
        let err = store.apply_batch(&BatchReorder::new(plan.placements)).unwrap_err();

        assert!(matches!(err, StorageError::StaleColumn { column: Column::Ideas }));
        assert_eq!(titles(&store, Column::Ideas), vec![pair("a", 0), pair("late", 1)]);
        assert!(store.get_item(a.id).unwrap().is_some());
    }

    #[test]
    fn test_unchanged_batch_round_trips() {
        let mut store = store();
        add(&mut store, "a", Column::Ideas);
        add(&mut store, "b", Column::Ideas);
        add(&mut store, "c", Column::Discussing);
        let before = store.snapshot().unwrap();

        let placements = before.items.iter().map(BoardItem::placement).collect();
        let mut batch = BatchReorder::new(placements);
        batch.expected_revisions = before.revisions.clone();
        store.apply_batch(&batch).unwrap();

        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_notes_and_documents() {
        let mut store = store();
        let item = add(&mut store, "item", Column::Ideas);

        let note = store
            .add_note(item.id, &NewNote { body: "looks promising".to_string() })
            .unwrap();
        let document = store
            .add_document(
                item.id,
                &NewDocument {
                    title: "RFC".to_string(),
                    location: "docs/rfc.md".to_string(),
                },
            )
            .unwrap();

        let loaded = store.get_item(item.id).unwrap().unwrap();
        assert_eq!(loaded.notes.len(), 1);
        assert_eq!(loaded.notes[0].id, note.id);
        assert_eq!(loaded.notes[0].body, "looks promising");
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].location, "docs/rfc.md");

        store.delete_note(item.id, note.id).unwrap();
        store.delete_document(item.id, document.id).unwrap();
        let loaded = store.get_item(item.id).unwrap().unwrap();
        assert!(loaded.notes.is_empty());
        assert!(loaded.documents.is_empty());

        let err = store.delete_note(item.id, note.id).unwrap_err();
        assert!(matches!(err, StorageError::UnknownNote { .. }));
        let err = store
            .add_note(Uuid::new_v4(), &NewNote { body: "orphan".to_string() })
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownItem { .. }));
    }

    #[test]
    fn test_repair_ordering() {
        let mut store = store();
        let a = add(&mut store, "a", Column::Ideas);
        let b = add(&mut store, "b", Column::Ideas);
        store
            .conn
            .execute(
                "UPDATE board_items SET position = 7 WHERE id = ?",
                params![b.id.to_string()],
            )
            .unwrap();
        store
            .conn
            .execute(
                "UPDATE board_items SET position = 3 WHERE id = ?",
                params![a.id.to_string()],
            )
            .unwrap();

        assert_eq!(store.repair_ordering().unwrap(), 2);
        assert_eq!(titles(&store, Column::Ideas), vec![pair("a", 0), pair("b", 1)]);
        assert_eq!(store.repair_ordering().unwrap(), 0);
    }

    #[test]
    fn test_mixed_operations_keep_ordering() {
        let mut store = store();
        let mut ids = Vec::new();
        for (i, column) in [Column::Ideas, Column::Ideas, Column::Exploring, Column::Ideas, Column::Closed]
            .into_iter()
            .enumerate()
        {
            ids.push(add(&mut store, &format!("item {}", i), column).id);
        }

        store.delete_item(ids[1], Some(0)).unwrap();
        assert!(check_ordering(&store.snapshot().unwrap().items).is_ok());

        let snapshot = store.snapshot().unwrap();
        let plan = plan_reorder(&snapshot.items, ids[3], DropTarget::new(Column::Closed, 0)).unwrap();
        store.apply_batch(&BatchReorder::new(plan.placements)).unwrap();
        assert!(check_ordering(&store.snapshot().unwrap().items).is_ok());

        store
            .update_item(
                ids[0],
                &ItemUpdate {
                    column: Some(Column::Exploring),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        assert!(check_ordering(&snapshot.items).is_ok());
        assert!(partition(&snapshot.items, Column::Ideas).is_empty());
    }
}
