//! Collaborator seams for the reconciliation runtime.
//!
//! Both traits return `impl Future + Send` rather than using `async fn`
//! so generic callers can spawn passes onto the runtime; implementations
//! are free to write plain `async fn`.
//!
//! Production implementations: `scd-vendor::HttpVendorClient` for
//! [`SalesLedger`], `scd-db::PgStore` for [`StockStore`]. Deterministic
//! in-memory stand-ins live in `scd-testkit`.

use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;
use scd_schemas::{Machine, Sale, StockItem, SyncCursor, Telemetry};

// ---------------------------------------------------------------------------
// SalesLedger — upstream vendor telemetry API
// ---------------------------------------------------------------------------

/// Read-only view of the upstream vendor API for one fleet.
pub trait SalesLedger: Send + Sync {
    /// Fetch the machine's sale window for one day, in stable append
    /// order (new sales at the end). The upstream does not support
    /// incremental queries; callers diff against their cursor.
    fn fetch_sales(
        &self,
        machine_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Sale>>> + Send;

    /// Topping positions currently present on the machine. Drives lazy
    /// stock-row creation; order is not significant.
    fn fetch_layout(&self, machine_id: &str) -> impl Future<Output = Result<Vec<i32>>> + Send;

    /// Current cabinet telemetry (temperature, sale counter).
    fn fetch_telemetry(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<Telemetry>> + Send;
}

// ---------------------------------------------------------------------------
// StockStore — persistent stock, cursors, machine registry
// ---------------------------------------------------------------------------

/// Persistence surface shared by the reconciler, the daemon routes and
/// the ops CLI.
pub trait StockStore: Send + Sync {
    fn get_cursor(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<Option<SyncCursor>>> + Send;

    fn put_cursor(&self, cursor: &SyncCursor) -> impl Future<Output = Result<()>> + Send;

    fn list_stock(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<Vec<StockItem>>> + Send;

    /// Decrement one slot by `by` units, floored at zero. Must be a
    /// single atomic update against the live row so a refill committed
    /// mid-pass is decremented from, not overwritten. A missing row is
    /// not an error (the position is simply untracked).
    fn decrement_units(
        &self,
        machine_id: &str,
        position: i32,
        by: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Reset one slot (or all slots when `position` is `None`) to capacity.
    fn refill(
        &self,
        machine_id: &str,
        position: Option<i32>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Create stock rows for newly observed positions; existing rows are
    /// left untouched. Never called mid-pass.
    fn init_layout(
        &self,
        machine_id: &str,
        positions: &[i32],
    ) -> impl Future<Output = Result<()>> + Send;

    fn list_machines(&self) -> impl Future<Output = Result<Vec<Machine>>> + Send;

    fn register_machine(&self, machine: &Machine) -> impl Future<Output = Result<()>> + Send;

    fn set_machine_active(
        &self,
        machine_id: &str,
        active: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}
