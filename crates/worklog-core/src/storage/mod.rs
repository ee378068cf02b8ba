//! Storage layer
//!
//! SQLite schema and the error type shared by every store operation.
//!
//! ## Tables
//!
//! - `board_items` - Items with their column and position
//! - `item_notes` / `item_documents` - Owned by an item, cascade-deleted
//! - `column_revisions` - Per-column counters for optimistic concurrency

pub mod error;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
