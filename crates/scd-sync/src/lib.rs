//! scd-sync
//!
//! Reconciliation runtime: drives the pure `scd-reconcile` engine
//! against real collaborators.
//!
//! Architectural decisions:
//! - Trait seams (`SalesLedger`, `StockStore`) keep the runner testable
//!   without a vendor API or a database
//! - At most one pass in flight per machine; an overlapping tick is
//!   skipped, never queued
//! - A fetch-level failure aborts the pass with the cursor untouched;
//!   a single topping's decrement failure does not block the others
//! - One periodic loop per machine; machines are fully independent
//! - Alert throttling is an explicit per-machine state object, not
//!   module-level globals

mod alerts;
mod guard;
mod runner;
mod scheduler;
mod traits;

pub use alerts::{Alert, AlertState};
pub use guard::{InFlightGuard, PassPermit};
pub use runner::{run_guarded_pass, run_pass, PassReport, SyncEvent, Watermarks};
pub use scheduler::{spawn_sync_loop, SyncLoopConfig, SyncLoopHandle};
pub use traits::{SalesLedger, StockStore};
