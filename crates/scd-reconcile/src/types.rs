use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cursor location
// ---------------------------------------------------------------------------

/// Where the prior cursor's sale id sits in a fetched window.
///
/// An explicit sum type rather than a sentinel index: `NotFound` and
/// `Found(0)` mean very different things and must never be conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMatch {
    /// Index of the cursor sale within the fetched window.
    Found(usize),
    /// The cursor's sale id is no longer present (window rotated).
    NotFound,
}

// ---------------------------------------------------------------------------
// Pass classification
// ---------------------------------------------------------------------------

/// What kind of reconciliation pass a plan represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// No prior cursor: establish one, deduct nothing. Prevents
    /// mis-attributing sales made before tracking began.
    Baseline,
    /// Prior cursor found in the window: deduct everything after it.
    Incremental,
    /// Prior cursor id absent from the window: deduct nothing, advance
    /// the cursor to the new tail so the backlog is never replayed.
    Rotated,
    /// Fetched window was empty: nothing to do, cursor untouched.
    EmptyWindow,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The cursor value a pass should record after applying its deductions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAdvance {
    /// Id of the last sale in the fetched window.
    pub last_sale_id: String,
}

/// Output of [`plan`](crate::plan): everything a pass runner needs to
/// apply, with no IO performed yet.
///
/// `deductions` is keyed by topping position; BTreeMap so application
/// order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub kind: PassKind,
    /// Total units to deduct per topping position.
    pub deductions: BTreeMap<i32, i64>,
    /// Number of distinct sales contributing to `deductions`.
    pub applied_sales: usize,
    /// Duplicate sale ids dropped from the window before aggregation.
    pub duplicates_dropped: usize,
    /// `None` when the window was empty (cursor must not move).
    pub advance: Option<CursorAdvance>,
}

impl ReconcilePlan {
    /// A plan that neither deducts nor moves the cursor.
    pub fn empty_window() -> Self {
        Self {
            kind: PassKind::EmptyWindow,
            deductions: BTreeMap::new(),
            applied_sales: 0,
            duplicates_dropped: 0,
            advance: None,
        }
    }

    /// True when the pass has no stock effect (it may still move the cursor).
    pub fn is_no_op(&self) -> bool {
        self.deductions.is_empty()
    }
}
