//! # Synchronization
//!
//! Turns buffer edits into remote mutations and folds the results back into
//! the block model.
//!
//! - **`plan`**: `Planner` diffs the tree and the orphan ranges into a
//!   `SyncPlan`
//! - **`executor`**: `Executor` runs a plan against a `RemoteStore`;
//!   independent operations overlap with the ordered chain of creates
//! - **`session`**: `SyncSession`, the per-buffer context that loads a page,
//!   prepares plans and executes them
//!
//! ## Partial Failure
//!
//! There is no rollback. Each operation succeeds or fails on its own and the
//! model reflects exactly the operations that succeeded.

pub mod executor;
pub mod plan;
pub mod session;

pub use executor::{Executor, OpError, OpKind, SyncReport};
pub use plan::{
    PlannedCreate, PlannedDelete, PlannedTypeChange, PlannedUpdate, Planner, SyncPlan,
};
pub use session::{HEADER_ROWS, SessionBuilder, SyncOutcome, SyncSession};
