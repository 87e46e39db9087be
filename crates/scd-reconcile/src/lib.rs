//! scd-reconcile
//!
//! Stock reconciliation engine.
//!
//! Architectural decisions:
//! - The sales ledger upstream is the source of truth for consumption
//! - First pass for a machine is a baseline: cursor only, no deductions
//! - A cursor id missing from the fetched window applies nothing (fail safe)
//! - Duplicate sale ids within one window are applied once
//! - Decrements floor at zero, never negative
//!
//! Deterministic, pure logic. No IO. No vendor calls.

mod engine;
mod types;
mod watermark;

pub use engine::{locate_cursor, plan};
pub use types::*;
pub use watermark::{FetchFreshness, FetchWatermark};
