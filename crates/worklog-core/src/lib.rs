//! worklog core library
//!
//! This crate provides the core of worklog, a personal work-tracking
//! board: research items pulled from an external issue tracker, sorted
//! into columns and ordered within each column.
//!
//! # Architecture
//!
//! - **SQLite**: the item store is the system of record for column
//!   membership and position
//! - **Board controller**: one session's disposable working copy, changed
//!   optimistically and rolled back when a persist fails
//!
//! Every column is kept at positions `0..n` at rest; each store mutation
//! that could break that renumbers in the same transaction.
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//!
//! // Add an item
//! let item = store.add_item(&NewItem::new("Investigate caching", Column::Ideas))?;
//!
//! // Read the board
//! let snapshot = store.snapshot()?;
//! let ideas = partition(&snapshot.items, Column::Ideas);
//! ```
//!
//! # Modules
//!
//! - `store`: SQLite item store (main entry point)
//! - `models`: Board items, columns and reorder batches
//! - `board`: Pure ordering functions (partition, drop target, reorder plan)
//! - `controller`: Optimistic board controller and backend seam
//! - `activity`: In-flight persist indicator
//! - `issue`: External issue references
//! - `storage`: Schema and storage errors
//! - `config`: Application configuration

pub mod activity;
pub mod board;
pub mod config;
pub mod controller;
pub mod issue;
pub mod models;
pub mod storage;
pub mod store;

pub use activity::{ActivityGuard, ActivityIndicator};
pub use board::{
    check_ordering, columns, filter_visible, partition, plan_reorder, resolve_drop_target,
    CardRect, DragSession, DropTarget, Hover, PlanError, ReorderPlan, Visibility,
};
pub use config::Config;
pub use controller::{
    AllowAll, AuthGate, BackendError, BoardBackend, BoardController, BoardError, CommitOutcome,
    LocalBackend, PendingCommit, ReadOnly,
};
pub use issue::{IssueDetails, IssueProvider, IssueRefError, IssueReference, OfflineIssueProvider};
pub use models::{
    BatchReorder, BoardItem, BoardSnapshot, Column, ColumnRevisions, ItemDocument, ItemId,
    ItemNote, ItemUpdate, MutationReceipt, NewDocument, NewItem, NewNote, ParseColumnError,
    Placement,
};
pub use storage::{StorageError, StorageResult};
pub use store::Store;
