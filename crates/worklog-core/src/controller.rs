//! Board controller
//!
//! Holds the working copy of the board for one viewing session and
//! mediates every change to it:
//!
//! - `load` replaces the working copy with the backend's snapshot
//! - `add_item` appends through the backend, then into the working copy
//! - `delete_item` and `apply_reorder` are optimistic: the working copy
//!   changes first, the backend is called second, and a failure restores
//!   the copy as it was before the change
//!
//! Persists are queued behind one async mutex (FIFO), so two batches from
//! the same session never race. When a persist fails the rollback also
//! advances an epoch; changes queued behind it were planned on top of the
//! reverted state and are discarded as [`BoardError::Superseded`].
//!
//! The working copy is disposable. The backend is the system of record and
//! `load` always recovers from any divergence.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::activity::ActivityIndicator;
use crate::board::{columns, partition, plan_reorder, DropTarget, PlanError};
use crate::models::{
    BatchReorder, BoardItem, BoardSnapshot, Column, ColumnRevisions, ItemId, MutationReceipt,
    NewItem, Placement,
};
use crate::storage::StorageError;
use crate::store::Store;

/// Default bound on a single persist
pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(10);

// ==================== Errors ====================

/// Transport-neutral failure reported by a [`BoardBackend`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request was malformed or referenced unknown items
    #[error("rejected: {0}")]
    Validation(String),

    /// The board changed underneath the request
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not allowed to modify the board")]
    Forbidden,

    /// Transport failure or server error; safe to retry
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for BackendError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            BackendError::Conflict(err.to_string())
        } else if err.is_not_found() {
            BackendError::NotFound(err.to_string())
        } else if err.is_validation() {
            BackendError::Validation(err.to_string())
        } else {
            tracing::error!(error = %err, "item store failure");
            BackendError::Unavailable("item store failure".to_string())
        }
    }
}

/// Errors surfaced by [`BoardController`]
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("not allowed to modify the board")]
    Forbidden,

    #[error("item {0} is not on the board")]
    UnknownItem(ItemId),

    /// The backend refused or failed; the working copy was restored
    #[error("change not saved: {0}")]
    NotSaved(#[source] BackendError),

    /// The persist took too long; the working copy was restored
    #[error("change not saved: timed out after {0:?}")]
    TimedOut(Duration),

    /// An earlier queued change failed and this one was planned on top of it
    #[error("change discarded because an earlier change failed to save")]
    Superseded,

    /// Loading the board failed
    #[error("failed to load board: {0}")]
    Load(#[source] BackendError),
}

impl BoardError {
    /// Short message suitable for a status line
    pub fn user_message(&self) -> String {
        match self {
            BoardError::Forbidden | BoardError::NotSaved(BackendError::Forbidden) => {
                "You are not allowed to change this board".to_string()
            }
            BoardError::UnknownItem(_) => "That item is no longer on the board".to_string(),
            BoardError::NotSaved(BackendError::Conflict(_)) => {
                "The board changed elsewhere. Reload (r) and retry".to_string()
            }
            BoardError::NotSaved(BackendError::Validation(msg)) => format!("Rejected: {}", msg),
            BoardError::NotSaved(_) | BoardError::TimedOut(_) | BoardError::Superseded => {
                "The move didn't save, please retry".to_string()
            }
            BoardError::Load(err) => format!("Could not load the board: {}", err),
        }
    }

    /// Whether the working copy is known to be stale
    pub fn needs_reload(&self) -> bool {
        matches!(
            self,
            BoardError::NotSaved(BackendError::Conflict(_) | BackendError::NotFound(_))
                | BoardError::TimedOut(_)
        )
    }
}

// ==================== Seams ====================

/// Where the authoritative board lives
#[async_trait]
pub trait BoardBackend: Send + Sync {
    async fn load_snapshot(&self) -> Result<BoardSnapshot, BackendError>;

    async fn add_item(&self, new: NewItem) -> Result<BoardItem, BackendError>;

    /// Delete `id`, refusing if its column is no longer at `expected_revision`
    async fn delete_item(
        &self,
        id: ItemId,
        expected_revision: Option<u64>,
    ) -> Result<MutationReceipt, BackendError>;

    /// Apply all placements or none
    async fn apply_batch(&self, batch: BatchReorder) -> Result<MutationReceipt, BackendError>;
}

/// The "may mutate" check consulted before add, move and delete
pub trait AuthGate: Send + Sync {
    fn may_mutate(&self) -> bool;
}

/// Every caller may mutate
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthGate for AllowAll {
    fn may_mutate(&self) -> bool {
        true
    }
}

/// Nobody may mutate
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl AuthGate for ReadOnly {
    fn may_mutate(&self) -> bool {
        false
    }
}

/// Backend over a store in this process
#[derive(Clone)]
pub struct LocalBackend {
    store: Arc<tokio::sync::Mutex<Store>>,
}

impl LocalBackend {
    pub fn new(store: Store) -> Self {
        Self::from_shared(Arc::new(tokio::sync::Mutex::new(store)))
    }

    pub fn from_shared(store: Arc<tokio::sync::Mutex<Store>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<tokio::sync::Mutex<Store>> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl BoardBackend for LocalBackend {
    async fn load_snapshot(&self) -> Result<BoardSnapshot, BackendError> {
        Ok(self.store.lock().await.snapshot()?)
    }

    async fn add_item(&self, new: NewItem) -> Result<BoardItem, BackendError> {
        Ok(self.store.lock().await.add_item(&new)?)
    }

    async fn delete_item(
        &self,
        id: ItemId,
        expected_revision: Option<u64>,
    ) -> Result<MutationReceipt, BackendError> {
        Ok(self.store.lock().await.delete_item(id, expected_revision)?)
    }

    async fn apply_batch(&self, batch: BatchReorder) -> Result<MutationReceipt, BackendError> {
        Ok(self.store.lock().await.apply_batch(&batch)?)
    }
}

// ==================== Controller ====================

#[derive(Debug, Default)]
struct BoardState {
    items: Vec<BoardItem>,
    revisions: ColumnRevisions,
    /// The backend said this session may only look
    read_only: bool,
    /// Advances on every rollback and reload
    epoch: u64,
}

/// An optimistic change that still has to be persisted
#[derive(Debug, Clone)]
#[must_use = "an optimistic change must be finished or it is never saved"]
pub struct PendingCommit {
    dragged: ItemId,
    placements: Vec<Placement>,
    previous: Vec<BoardItem>,
    epoch: u64,
    changed: bool,
}

impl PendingCommit {
    pub fn dragged(&self) -> ItemId {
        self.dragged
    }

    /// False when the drop left every item in place
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Saved,
    /// Nothing moved, so nothing was sent
    Unchanged,
}

/// Owns the working copy of the board
#[derive(Clone)]
pub struct BoardController {
    backend: Arc<dyn BoardBackend>,
    gate: Arc<dyn AuthGate>,
    state: Arc<Mutex<BoardState>>,
    persist_queue: Arc<tokio::sync::Mutex<()>>,
    activity: ActivityIndicator,
    timeout: Duration,
}

impl BoardController {
    pub fn new(backend: Arc<dyn BoardBackend>, gate: Arc<dyn AuthGate>) -> Self {
        Self {
            backend,
            gate,
            state: Arc::new(Mutex::new(BoardState::default())),
            persist_queue: Arc::new(tokio::sync::Mutex::new(())),
            activity: ActivityIndicator::new(),
            timeout: DEFAULT_PERSIST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn activity(&self) -> ActivityIndicator {
        self.activity.clone()
    }

    /// Whether add, move and delete are allowed
    ///
    /// False when the gate refuses or the last snapshot was read-only.
    pub fn may_mutate(&self) -> bool {
        self.gate.may_mutate() && !self.state().read_only
    }

    /// Current working copy
    pub fn items(&self) -> Vec<BoardItem> {
        self.state().items.clone()
    }

    pub fn revisions(&self) -> ColumnRevisions {
        self.state().revisions.clone()
    }

    pub fn item(&self, id: ItemId) -> Option<BoardItem> {
        self.state().items.iter().find(|item| item.id == id).cloned()
    }

    /// One column in render order
    pub fn column(&self, column: Column) -> Vec<BoardItem> {
        partition(&self.state().items, column)
    }

    /// All columns in render order
    pub fn columns(&self) -> Vec<(Column, Vec<BoardItem>)> {
        columns(&self.state().items)
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_may_mutate(&self) -> Result<(), BoardError> {
        if self.may_mutate() {
            Ok(())
        } else {
            Err(BoardError::Forbidden)
        }
    }

    /// Replace the working copy with the backend's snapshot
    ///
    /// Waits for the persist in flight, if any. Optimistic changes not yet
    /// persisted are discarded.
    pub async fn load(&self) -> Result<(), BoardError> {
        let _turn = self.persist_queue.lock().await;
        let _activity = self.activity.begin();

        let snapshot = tokio::time::timeout(self.timeout, self.backend.load_snapshot())
            .await
            .map_err(|_| BoardError::Load(BackendError::Unavailable("timed out".to_string())))?
            .map_err(BoardError::Load)?;

        let mut state = self.state();
        tracing::debug!(
            items = snapshot.items.len(),
            read_only = snapshot.read_only,
            "loaded board"
        );
        state.items = snapshot.items;
        state.revisions = snapshot.revisions;
        state.read_only = snapshot.read_only;
        state.epoch += 1;
        Ok(())
    }

    /// Add an item at the end of its column
    pub async fn add_item(&self, new: NewItem) -> Result<BoardItem, BoardError> {
        self.ensure_may_mutate()?;
        let _turn = self.persist_queue.lock().await;
        let _activity = self.activity.begin();

        let item = match tokio::time::timeout(self.timeout, self.backend.add_item(new)).await {
            Ok(Ok(item)) => item,
            Ok(Err(err)) => return Err(BoardError::NotSaved(err)),
            Err(_) => return Err(BoardError::TimedOut(self.timeout)),
        };

        let mut state = self.state();
        state.items.retain(|existing| existing.id != item.id);
        state.items.push(item.clone());
        Ok(item)
    }

    /// Remove an item, closing the gap in its column
    ///
    /// The removal is visible immediately and undone if the backend fails.
    pub async fn delete_item(&self, id: ItemId) -> Result<(), BoardError> {
        self.ensure_may_mutate()?;

        let (previous, epoch, column) = {
            let mut state = self.state();
            let removed = state
                .items
                .iter()
                .find(|item| item.id == id)
                .map(|item| (item.column, item.position))
                .ok_or(BoardError::UnknownItem(id))?;
            let previous = state.items.clone();
            state.items.retain(|item| item.id != id);
            for item in state.items.iter_mut() {
                if item.column == removed.0 && item.position > removed.1 {
                    item.position -= 1;
                }
            }
            (previous, state.epoch, removed.0)
        };

        let _turn = self.persist_queue.lock().await;
        let expected = {
            let state = self.state();
            if state.epoch != epoch {
                return Err(BoardError::Superseded);
            }
            // Read after earlier queued persists merged their revisions
            state.revisions.get(&column).copied().unwrap_or(0)
        };
        let _activity = self.activity.begin();

        let request = self.backend.delete_item(id, Some(expected));
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(receipt)) => {
                self.merge_revisions(&receipt, [column]);
                tracing::debug!(item = %id, %column, "deleted item");
                Ok(())
            }
            Ok(Err(err)) => {
                self.rollback(previous, epoch);
                tracing::warn!(item = %id, error = %err, "delete failed, restored board");
                Err(BoardError::NotSaved(err))
            }
            Err(_) => {
                self.rollback(previous, epoch);
                tracing::warn!(item = %id, timeout = ?self.timeout, "delete timed out, restored board");
                Err(BoardError::TimedOut(self.timeout))
            }
        }
    }

    /// Plan a drop and apply it to the working copy
    ///
    /// Synchronous: the board reflects the move as soon as this returns.
    /// Pass the result to [`finish`](Self::finish) to persist it.
    pub fn begin_reorder(
        &self,
        dragged: ItemId,
        target: DropTarget,
    ) -> Result<PendingCommit, BoardError> {
        self.ensure_may_mutate()?;

        let mut state = self.state();
        let plan = plan_reorder(&state.items, dragged, target).map_err(|err| match err {
            PlanError::UnknownItem(id) => BoardError::UnknownItem(id),
        })?;

        let previous = if plan.changed {
            std::mem::replace(&mut state.items, plan.items)
        } else {
            Vec::new()
        };

        Ok(PendingCommit {
            dragged,
            placements: plan.placements,
            previous,
            epoch: state.epoch,
            changed: plan.changed,
        })
    }

    /// Persist an optimistic change, restoring the board if it fails
    pub async fn finish(&self, pending: PendingCommit) -> Result<CommitOutcome, BoardError> {
        if !pending.changed {
            tracing::debug!(item = %pending.dragged, "drop left the board unchanged");
            return Ok(CommitOutcome::Unchanged);
        }

        let _turn = self.persist_queue.lock().await;

        let (batch, touched) = {
            let state = self.state();
            if state.epoch != pending.epoch {
                tracing::debug!(item = %pending.dragged, "discarding change queued behind a rollback");
                return Err(BoardError::Superseded);
            }
            let touched: BTreeSet<Column> =
                pending.placements.iter().map(|placement| placement.column).collect();
            let mut batch = BatchReorder::new(pending.placements.clone());
            // Revisions as of the last persist; earlier queued commits have
            // already merged theirs
            batch.expected_revisions = touched
                .iter()
                .map(|&column| (column, state.revisions.get(&column).copied().unwrap_or(0)))
                .collect();
            (batch, touched)
        };

        let _activity = self.activity.begin();
        match tokio::time::timeout(self.timeout, self.backend.apply_batch(batch)).await {
            Ok(Ok(receipt)) => {
                self.merge_revisions(&receipt, touched);
                tracing::debug!(item = %pending.dragged, "persisted reorder");
                Ok(CommitOutcome::Saved)
            }
            Ok(Err(err)) => {
                tracing::warn!(item = %pending.dragged, error = %err, "reorder failed, restored board");
                self.rollback(pending.previous, pending.epoch);
                Err(BoardError::NotSaved(err))
            }
            Err(_) => {
                tracing::warn!(item = %pending.dragged, timeout = ?self.timeout, "reorder timed out, restored board");
                self.rollback(pending.previous, pending.epoch);
                Err(BoardError::TimedOut(self.timeout))
            }
        }
    }

    /// Plan, apply and persist a drop
    pub async fn apply_reorder(
        &self,
        dragged: ItemId,
        target: DropTarget,
    ) -> Result<CommitOutcome, BoardError> {
        let pending = self.begin_reorder(dragged, target)?;
        self.finish(pending).await
    }

    fn rollback(&self, previous: Vec<BoardItem>, epoch: u64) {
        let mut state = self.state();
        if state.epoch == epoch {
            state.items = previous;
            state.epoch += 1;
        }
    }

    /// Take revisions for the columns this session just wrote
    ///
    /// Other columns keep the revision the working copy was loaded with, so
    /// changes made elsewhere are still detected as conflicts.
    fn merge_revisions(
        &self,
        receipt: &MutationReceipt,
        touched: impl IntoIterator<Item = Column>,
    ) {
        let mut state = self.state();
        for column in touched {
            if let Some(&revision) = receipt.revisions.get(&column) {
                state.revisions.insert(column, revision);
            }
        }
    }
}
