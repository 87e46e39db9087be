//! Single reconciliation pass: cursor read → ledger fetch → plan →
//! best-effort decrements → cursor advance.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use scd_reconcile::{FetchWatermark, PassKind};
use scd_schemas::SyncCursor;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alerts::Alert;
use crate::guard::InFlightGuard;
use crate::traits::{SalesLedger, StockStore};

// ---------------------------------------------------------------------------
// Watermark registry
// ---------------------------------------------------------------------------

/// Per-machine [`FetchWatermark`]s behind one shared handle, so periodic
/// loops and manual triggers enforce the same monotonicity.
#[derive(Clone, Default)]
pub struct Watermarks {
    inner: Arc<Mutex<HashMap<String, FetchWatermark>>>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept-or-reject a fetch timestamp for one machine, advancing
    /// that machine's watermark on acceptance.
    pub fn accept(&self, machine_id: &str, fetched_at_ms: i64) -> scd_reconcile::FetchFreshness {
        let mut map = self.inner.lock().expect("watermark map poisoned");
        map.entry(machine_id.to_string())
            .or_default()
            .accept(fetched_at_ms)
    }
}

// ---------------------------------------------------------------------------
// Pass report & events
// ---------------------------------------------------------------------------

/// Summary of one completed pass, for logging and the daemon event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub machine_id: String,
    pub kind: PassKind,
    pub applied_sales: usize,
    pub duplicates_dropped: usize,
    pub deducted_positions: usize,
    /// Positions consumed upstream but not tracked locally (no stock row).
    pub untracked_positions: usize,
    /// Positions whose decrement failed this pass (lost deduction accepted).
    pub failed_positions: usize,
    pub cursor: Option<String>,
}

/// Messages emitted by the sync runtime onto a broadcast bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    PassCompleted { report: PassReport },
    PassSkipped { machine_id: String },
    PassFailed { machine_id: String, error: String },
    Alert { alert: Alert },
}

// ---------------------------------------------------------------------------
// run_pass
// ---------------------------------------------------------------------------

/// Execute one reconciliation pass for `machine_id`.
///
/// Error policy:
/// - cursor read or ledger fetch failure aborts the pass; the cursor is
///   untouched and the next tick retries from it;
/// - a stale fetch (older than this machine's watermark) aborts the same way;
/// - a single slot's decrement failure is logged and the remaining slots
///   are still attempted; the cursor advances at pass end regardless
///   (that slot's deduction is accepted as lost — stock is advisory);
/// - the cursor write itself is the last step and its failure is the
///   pass's failure.
pub async fn run_pass<S, L>(
    store: &S,
    ledger: &L,
    watermarks: &Watermarks,
    machine_id: &str,
) -> Result<PassReport>
where
    S: StockStore,
    L: SalesLedger,
{
    let prior = store
        .get_cursor(machine_id)
        .await
        .context("cursor read failed")?;

    let today = Utc::now().date_naive();
    let sales = ledger
        .fetch_sales(machine_id, today)
        .await
        .context("ledger fetch failed")?;

    let fetched_at_ms = Utc::now().timestamp_millis();
    let freshness = watermarks.accept(machine_id, fetched_at_ms);
    if freshness.is_rejected() {
        bail!("ledger fetch rejected by watermark: {freshness:?}");
    }

    let plan = scd_reconcile::plan(prior.as_ref(), &sales);

    let tracked: BTreeSet<i32> = store
        .list_stock(machine_id)
        .await
        .context("stock read failed")?
        .into_iter()
        .map(|item| item.position)
        .collect();

    let mut deducted = 0usize;
    let mut untracked = 0usize;
    let mut failed = 0usize;

    for (&position, &qty) in &plan.deductions {
        if !tracked.contains(&position) {
            // No row for this slot: layout init handles row creation,
            // never the middle of a pass.
            debug!(machine_id, position, qty, "skipping untracked position");
            untracked += 1;
            continue;
        }
        match store.decrement_units(machine_id, position, qty).await {
            Ok(()) => deducted += 1,
            Err(err) => {
                warn!(machine_id, position, qty, %err, "decrement failed; continuing pass");
                failed += 1;
            }
        }
    }

    if let Some(adv) = &plan.advance {
        store
            .put_cursor(&SyncCursor {
                machine_id: machine_id.to_string(),
                last_sale_id: adv.last_sale_id.clone(),
                last_synced_at: Utc::now(),
            })
            .await
            .context("cursor write failed")?;
    }

    let report = PassReport {
        machine_id: machine_id.to_string(),
        kind: plan.kind,
        applied_sales: plan.applied_sales,
        duplicates_dropped: plan.duplicates_dropped,
        deducted_positions: deducted,
        untracked_positions: untracked,
        failed_positions: failed,
        cursor: plan.advance.map(|a| a.last_sale_id),
    };

    debug!(
        machine_id,
        kind = ?report.kind,
        applied = report.applied_sales,
        "reconciliation pass complete"
    );

    Ok(report)
}

/// [`run_pass`] behind the per-machine in-flight guard.
///
/// Returns `Ok(None)` when a pass is already running for this machine
/// (the caller's tick is skipped, not queued).
pub async fn run_guarded_pass<S, L>(
    store: &S,
    ledger: &L,
    guard: &InFlightGuard,
    watermarks: &Watermarks,
    machine_id: &str,
) -> Result<Option<PassReport>>
where
    S: StockStore,
    L: SalesLedger,
{
    let Some(_permit) = guard.try_begin(machine_id) else {
        debug!(machine_id, "pass already in flight; tick skipped");
        return Ok(None);
    };
    let report = run_pass(store, ledger, watermarks, machine_id).await?;
    Ok(Some(report))
}
