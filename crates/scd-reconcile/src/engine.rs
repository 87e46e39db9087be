use std::collections::{BTreeMap, HashSet};

use scd_schemas::{Sale, SyncCursor};

use crate::{CursorAdvance, CursorMatch, PassKind, ReconcilePlan};

/// Locate the prior cursor's sale id within a fetched window.
///
/// The window is scanned from the tail because the cursor is usually at
/// or near the end of it.
pub fn locate_cursor(sales: &[Sale], last_sale_id: &str) -> CursorMatch {
    match sales.iter().rposition(|s| s.sale_id == last_sale_id) {
        Some(idx) => CursorMatch::Found(idx),
        None => CursorMatch::NotFound,
    }
}

/// Compute a reconciliation plan for one machine from its prior cursor
/// and a freshly fetched sale window.
///
/// Policies (in order):
/// - Empty window: nothing to deduct, cursor untouched.
/// - No prior cursor: baseline pass — record the tail id, deduct nothing.
/// - Cursor found at index `i`: the unprocessed slice is `sales[i+1..]`.
/// - Cursor not found (window rotated): unprocessed slice is empty; the
///   cursor still advances to the new tail so an unbounded backlog is
///   never replayed.
///
/// Within the unprocessed slice, duplicate sale ids are applied once
/// (first occurrence wins) and multiple consumption entries for the same
/// position within one sale sum before decrementing.
pub fn plan(prior: Option<&SyncCursor>, sales: &[Sale]) -> ReconcilePlan {
    let Some(tail) = sales.last() else {
        return ReconcilePlan::empty_window();
    };
    let advance = Some(CursorAdvance {
        last_sale_id: tail.sale_id.clone(),
    });

    let Some(cursor) = prior else {
        return ReconcilePlan {
            kind: PassKind::Baseline,
            deductions: BTreeMap::new(),
            applied_sales: 0,
            duplicates_dropped: 0,
            advance,
        };
    };

    let (kind, unprocessed): (PassKind, &[Sale]) =
        match locate_cursor(sales, &cursor.last_sale_id) {
            CursorMatch::Found(idx) => (PassKind::Incremental, &sales[idx + 1..]),
            CursorMatch::NotFound => (PassKind::Rotated, &[]),
        };

    let (deductions, applied_sales, duplicates_dropped) = aggregate(unprocessed);

    ReconcilePlan {
        kind,
        deductions,
        applied_sales,
        duplicates_dropped,
        advance,
    }
}

/// Sum consumption per position over a slice of sales, deduplicating by
/// sale id. Returns (deductions, distinct sales applied, duplicates dropped).
fn aggregate(sales: &[Sale]) -> (BTreeMap<i32, i64>, usize, usize) {
    let mut deductions: BTreeMap<i32, i64> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut applied = 0usize;
    let mut dropped = 0usize;

    for sale in sales {
        if !seen.insert(sale.sale_id.as_str()) {
            dropped += 1;
            continue;
        }
        applied += 1;
        for t in &sale.toppings {
            *deductions.entry(t.position).or_insert(0) += t.qty;
        }
    }

    (deductions, applied, dropped)
}
