//! Board ordering
//!
//! Pure functions over a board's item collection:
//!
//! - `partition`: a column's members in render order
//! - `drop_target`: pointer geometry during a drag → `(column, index)`
//! - `reorder`: the new placements for a drop, renumbered contiguously
//! - `visibility`: public/privileged filtering applied before partitioning
//!
//! None of these touch storage; the controller and the store build on them.

pub mod drop_target;
pub mod partition;
pub mod reorder;
pub mod visibility;

pub use drop_target::{resolve_drop_target, CardRect, DragSession, DropTarget, Hover};
pub use partition::{check_ordering, columns, partition, OrderingViolation};
pub use reorder::{plan_reorder, PlanError, ReorderPlan};
pub use visibility::{filter_visible, Visibility};
