//! scd-testkit
//!
//! Deterministic in-memory stand-ins for the sync runtime's collaborator
//! seams, plus builders shared by the scenario tests under `tests/`.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - `MemStore` mirrors the Postgres semantics that matter to the
//!   reconciler: atomic floor-at-zero decrement against the live row,
//!   ON-CONFLICT-DO-NOTHING layout init, refill to capacity.
//! - `ScriptedVendor` serves whatever sale window the test scripted;
//!   fault and latency injection are explicit knobs, never randomness.

mod mem_store;
mod scripted_vendor;

pub use mem_store::MemStore;
pub use scripted_vendor::ScriptedVendor;

use chrono::{TimeZone, Utc};
use scd_schemas::{Sale, ToppingConsumption};

/// Build a sale with fixed timestamp/product/price; tests only care
/// about ids and consumption.
pub fn sale(id: &str, toppings: &[(i32, i64)]) -> Sale {
    Sale {
        sale_id: id.to_string(),
        ts_utc: Utc.timestamp_opt(1_756_500_000, 0).unwrap(),
        product: "vanilla-cone".to_string(),
        price_cents: 350,
        toppings: toppings
            .iter()
            .map(|&(position, qty)| ToppingConsumption { position, qty })
            .collect(),
    }
}
