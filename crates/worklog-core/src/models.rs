//! Data models for worklog
//!
//! Defines the board entities: `BoardItem` with its owned notes and
//! documents, the closed set of `Column`s, and the wire shapes used to
//! add, edit and reorder items.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a board item
pub type ItemId = Uuid;

/// One of the fixed board columns
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    #[default]
    Ideas,
    Exploring,
    Discussing,
    Closed,
}

impl Column {
    /// All columns in board order (left to right)
    pub const ALL: [Column; 4] = [
        Column::Ideas,
        Column::Exploring,
        Column::Discussing,
        Column::Closed,
    ];

    /// Lowercase identifier used in storage and on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Ideas => "ideas",
            Column::Exploring => "exploring",
            Column::Discussing => "discussing",
            Column::Closed => "closed",
        }
    }

    /// Human-readable heading
    pub fn title(self) -> &'static str {
        match self {
            Column::Ideas => "Ideas",
            Column::Exploring => "Exploring",
            Column::Discussing => "Discussing",
            Column::Closed => "Closed",
        }
    }

    /// Zero-based index in board order
    pub fn index(self) -> usize {
        match self {
            Column::Ideas => 0,
            Column::Exploring => 1,
            Column::Discussing => 2,
            Column::Closed => 3,
        }
    }

    /// Column to the left, if any
    pub fn prev(self) -> Option<Column> {
        self.index().checked_sub(1).map(|i| Column::ALL[i])
    }

    /// Column to the right, if any
    pub fn next(self) -> Option<Column> {
        Column::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a column name is not one of the board columns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown column '{0}' (expected one of: ideas, exploring, discussing, closed)")]
pub struct ParseColumnError(pub String);

impl FromStr for Column {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ideas" => Ok(Column::Ideas),
            "exploring" => Ok(Column::Exploring),
            "discussing" => Ok(Column::Discussing),
            "closed" => Ok(Column::Closed),
            _ => Err(ParseColumnError(s.to_string())),
        }
    }
}

/// A research item on the board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardItem {
    /// Unique identifier
    pub id: ItemId,
    /// Column membership
    pub column: Column,
    /// Zero-based rank within the column
    pub position: u32,
    /// Display title (usually the issue title)
    pub title: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// External issue key, e.g. `acme/research#42`
    pub issue_key: Option<String>,
    /// Canonical URL of the external issue
    pub issue_url: Option<String>,
    /// Notes attached to this item
    #[serde(default)]
    pub notes: Vec<ItemNote>,
    /// Documents attached to this item
    #[serde(default)]
    pub documents: Vec<ItemDocument>,
    /// When this item was created
    pub created_at: DateTime<Utc>,
    /// When this item was last updated
    pub updated_at: DateTime<Utc>,
}

impl BoardItem {
    /// Create a new item at the top of the given column
    ///
    /// The store assigns the real position when the item is added.
    pub fn new(title: impl Into<String>, column: Column) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            column,
            position: 0,
            title: title.into(),
            description: None,
            issue_key: None,
            issue_url: None,
            notes: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current placement triple
    pub fn placement(&self) -> Placement {
        Placement {
            id: self.id,
            column: self.column,
            position: self.position,
        }
    }

    /// Whether this item is hidden from the public board
    ///
    /// An item is private when the repository segment of its issue key
    /// ends with `marker` (e.g. `acme/roadmap-private#12`).
    pub fn is_private(&self, marker: &str) -> bool {
        if marker.is_empty() {
            return false;
        }
        let Some(key) = self.issue_key.as_deref() else {
            return false;
        };
        let repo = key.split('#').next().unwrap_or(key);
        let repo = repo.rsplit('/').next().unwrap_or(repo);
        repo.ends_with(marker)
    }
}

/// A note attached to a board item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemNote {
    /// Unique identifier
    pub id: Uuid,
    /// Note body (markdown source)
    pub body: String,
    /// When this note was created
    pub created_at: DateTime<Utc>,
}

impl ItemNote {
    /// Create a new note
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// A document reference attached to a board item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDocument {
    /// Unique identifier
    pub id: Uuid,
    /// Document title
    pub title: String,
    /// Where the document lives (URL or path)
    pub location: String,
    /// When this document was attached
    pub created_at: DateTime<Utc>,
}

impl ItemDocument {
    /// Create a new document reference
    pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            location: location.into(),
            created_at: Utc::now(),
        }
    }
}

/// Input for adding a new board item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewItem {
    pub title: String,
    #[serde(default)]
    pub column: Column,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_key: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
}

impl NewItem {
    pub fn new(title: impl Into<String>, column: Column) -> Self {
        Self {
            title: title.into(),
            column,
            ..Self::default()
        }
    }
}

/// Partial update of an item's fields
///
/// `None` leaves a field unchanged. For the optional text fields an empty
/// string clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_key: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
    /// Non-drag move: the item is appended to the end of this column
    #[serde(default)]
    pub column: Option<Column>,
}

impl ItemUpdate {
    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.issue_key.is_none()
            && self.issue_url.is_none()
            && self.column.is_none()
    }
}

/// Input for attaching a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub location: String,
}

/// Input for attaching a note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNote {
    pub body: String,
}

/// The `(id, column, position)` triple of a reorder batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Placement {
    pub id: ItemId,
    pub column: Column,
    pub position: u32,
}

/// Per-column revision counters
///
/// A column's revision is bumped whenever its membership or order is
/// rewritten. Columns that were never rewritten are absent (revision 0).
pub type ColumnRevisions = BTreeMap<Column, u64>;

/// A single atomic reorder request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReorder {
    pub placements: Vec<Placement>,
    /// Revisions the client planned against; a mismatch is a conflict.
    /// Columns missing from the map are not checked.
    #[serde(default)]
    pub expected_revisions: ColumnRevisions,
}

impl BatchReorder {
    pub fn new(placements: Vec<Placement>) -> Self {
        Self {
            placements,
            expected_revisions: ColumnRevisions::new(),
        }
    }
}

/// Revisions after a successful mutation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MutationReceipt {
    pub revisions: ColumnRevisions,
}

/// Full board as loaded from the item store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoardSnapshot {
    pub items: Vec<BoardItem>,
    #[serde(default)]
    pub revisions: ColumnRevisions,
    /// Set when the caller may look but not change anything
    #[serde(default)]
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_round_trips_through_str() {
        for column in Column::ALL {
            assert_eq!(column.as_str().parse::<Column>().unwrap(), column);
        }
        assert_eq!(" Exploring ".parse::<Column>().unwrap(), Column::Exploring);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = "backlog".parse::<Column>().unwrap_err();
        assert_eq!(err, ParseColumnError("backlog".to_string()));
        assert!(err.to_string().contains("backlog"));
    }

    #[test]
    fn test_column_neighbours() {
        assert_eq!(Column::Ideas.prev(), None);
        assert_eq!(Column::Ideas.next(), Some(Column::Exploring));
        assert_eq!(Column::Closed.next(), None);
        assert_eq!(Column::Closed.prev(), Some(Column::Discussing));
    }

    #[test]
    fn test_column_serializes_lowercase() {
        let json = serde_json::to_string(&Column::Discussing).unwrap();
        assert_eq!(json, "\"discussing\"");
    }

    #[test]
    fn test_item_new() {
        let item = BoardItem::new("Investigate caching", Column::Exploring);
        assert_eq!(item.column, Column::Exploring);
        assert_eq!(item.position, 0);
        assert!(item.notes.is_empty());
        assert!(item.documents.is_empty());
    }

    #[test]
    fn test_private_marker_matches_repository_segment() {
        let mut item = BoardItem::new("Secret", Column::Ideas);
        assert!(!item.is_private("-private"));

        item.issue_key = Some("acme/roadmap-private#12".to_string());
        assert!(item.is_private("-private"));

        item.issue_key = Some("acme/roadmap#12".to_string());
        assert!(!item.is_private("-private"));

        // Marker in the owner segment does not count
        item.issue_key = Some("team-private/roadmap#3".to_string());
        assert!(!item.is_private("-private"));

        // An empty marker disables the filter
        item.issue_key = Some("acme/roadmap-private#12".to_string());
        assert!(!item.is_private(""));
    }

    #[test]
    fn test_item_update_is_empty() {
        assert!(ItemUpdate::default().is_empty());
        let update = ItemUpdate {
            column: Some(Column::Closed),
            ..ItemUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_batch_reorder_defaults_expected_revisions() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"placements":[{{"id":"{}","column":"ideas","position":0}}]}}"#,
            id
        );
        let batch: BatchReorder = serde_json::from_str(&json).unwrap();
        assert_eq!(batch.placements.len(), 1);
        assert!(batch.expected_revisions.is_empty());
    }
}
