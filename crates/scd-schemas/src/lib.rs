//! scd-schemas
//!
//! Shared domain types for the ScoopDesk fleet backend.
//!
//! Conventions:
//! - Timestamps are `DateTime<Utc>` everywhere.
//! - Money stays in integer cents; wire payloads that carry decimal
//!   strings are normalized at the vendor boundary (scd-vendor).
//! - No IO and no business logic here beyond small invariant helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default capacity for a topping slot created by lazy layout init,
/// before an admin sets the real value.
pub const DEFAULT_CAPACITY: i64 = 100;

/// Default low-stock alert threshold for a freshly created slot.
pub const DEFAULT_ALERT_THRESHOLD: i64 = 20;

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// One physical vending unit, identified by its hardware id (IMEI/MAC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Hardware identifier as reported by the vendor API.
    pub machine_id: String,
    pub display_name: String,
    pub location: Option<String>,
    /// Inactive machines keep their rows but are not polled.
    pub active: bool,
    /// Owning franchisee account.
    pub owner_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Sales ledger
// ---------------------------------------------------------------------------

/// One topping-consumption entry attached to a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToppingConsumption {
    /// Dispenser slot on the machine.
    pub position: i32,
    /// Units consumed. The wire value may be text or absent; the vendor
    /// boundary normalizes it (absent/malformed parses as 1).
    pub qty: i64,
}

/// One completed vend transaction from the upstream ledger.
///
/// Sales are immutable upstream and returned in stable append order;
/// `sale_id` is unique within a machine. The local system only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub sale_id: String,
    pub ts_utc: DateTime<Utc>,
    pub product: String,
    pub price_cents: i64,
    pub toppings: Vec<ToppingConsumption>,
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// Per-machine, per-slot stock record.
///
/// Invariant: `0 <= units_current <= capacity_max`. Writers are the
/// reconciler (decrement, floored at zero) and admin refill (reset to
/// capacity). Rows are created lazily when a machine's topping layout is
/// first observed and never auto-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub machine_id: String,
    pub position: i32,
    pub units_current: i64,
    pub capacity_max: i64,
    pub alert_threshold: i64,
}

impl StockItem {
    /// Fresh slot at full capacity with default thresholds.
    pub fn new_full(machine_id: impl Into<String>, position: i32) -> Self {
        Self {
            machine_id: machine_id.into(),
            position,
            units_current: DEFAULT_CAPACITY,
            capacity_max: DEFAULT_CAPACITY,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    /// True when the slot is at or below its low-stock threshold.
    pub fn is_low(&self) -> bool {
        self.units_current <= self.alert_threshold
    }

    /// Fill level in percent, clamped to 0..=100.
    pub fn fill_pct(&self) -> i64 {
        if self.capacity_max <= 0 {
            return 0;
        }
        (self.units_current.clamp(0, self.capacity_max) * 100) / self.capacity_max
    }
}

// ---------------------------------------------------------------------------
// Sync cursor
// ---------------------------------------------------------------------------

/// Per-machine bookmark: the most recent sale already applied to stock.
///
/// Monotonically non-decreasing in ledger order; a sale is applied at
/// most once across all reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub machine_id: String,
    pub last_sale_id: String,
    pub last_synced_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Point-in-time cabinet telemetry reported by the vendor API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub machine_id: String,
    pub cabinet_temp_c: f64,
    /// Total completed sales today, as counted upstream.
    pub sale_count_today: i64,
    pub captured_at_utc: DateTime<Utc>,
}
