//! Request and response types for all scd-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use chrono::{DateTime, Utc};
use scd_schemas::{Machine, StockItem};
use scd_sync::PassReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

/// Per-machine slice of the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStatus {
    pub machine_id: String,
    pub active: bool,
    /// A periodic sync loop is registered and alive for this machine.
    pub loop_running: bool,
    /// A reconciliation pass is executing right now.
    pub in_flight: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub daemon_uptime_secs: u64,
    pub tracked_machines: usize,
    pub machines: Vec<MachineStatus>,
}

// ---------------------------------------------------------------------------
// /v1/machines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachinesResponse {
    pub machines: Vec<Machine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachineRequest {
    pub machine_id: String,
    pub display_name: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Registering an inactive machine records it without starting a loop.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// /v1/machines/:id/stock  /v1/machines/:id/refill
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockResponse {
    pub machine_id: String,
    pub items: Vec<StockItem>,
}

/// Refill body: one position, or the whole machine when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefillRequest {
    #[serde(default)]
    pub position: Option<i32>,
}

// ---------------------------------------------------------------------------
// /v1/machines/:id/sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub report: PassReport,
}

/// 409 body when a pass for the machine is already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBusyResponse {
    pub error: String,
    pub machine_id: String,
}

// ---------------------------------------------------------------------------
// Generic error body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
