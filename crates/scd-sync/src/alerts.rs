//! Edge-triggered alert decisions with explicit per-machine state.
//!
//! The state lives in [`AlertState`], owned by whoever runs the sweep
//! (one per sync loop) and passed by reference to the pure `observe_*`
//! decision methods. Lifecycle: created when a machine starts being
//! tracked, dropped (or [`reset`][AlertState::reset]) when tracking
//! switches machines — observations never leak across machines.

use std::collections::BTreeSet;

use scd_schemas::StockItem;
use serde::{Deserialize, Serialize};

/// Throttled, user-facing alert kinds surfaced on the daemon event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// The upstream sale counter increased since the last observation.
    NewSales { machine_id: String, new_count: i64 },
    /// A slot crossed its low-stock threshold downwards.
    LowStock {
        machine_id: String,
        position: i32,
        units: i64,
        threshold: i64,
    },
    /// Cabinet temperature rose above the configured ceiling.
    TempHigh {
        machine_id: String,
        temp_c: f64,
        max_c: f64,
    },
    /// Temperature returned below the ceiling after a TempHigh.
    TempRecovered { machine_id: String, temp_c: f64 },
}

/// Per-machine alert throttle state.
#[derive(Debug, Clone)]
pub struct AlertState {
    machine_id: String,
    /// Last sale count seen; `None` until the first observation primes it.
    last_sale_count: Option<i64>,
    /// True while a TempHigh alert is outstanding.
    temp_alert_active: bool,
    /// Positions currently below threshold (alert already sent).
    low_positions: BTreeSet<i32>,
}

impl AlertState {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            last_sale_count: None,
            temp_alert_active: false,
            low_positions: BTreeSet::new(),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Forget all observations. Call when the tracked machine changes;
    /// the next observations prime rather than alert.
    pub fn reset(&mut self) {
        self.last_sale_count = None;
        self.temp_alert_active = false;
        self.low_positions.clear();
    }

    /// Observe the upstream sale counter. The first observation primes
    /// the state silently; later increases alert once per increase.
    pub fn observe_sale_count(&mut self, count: i64) -> Option<Alert> {
        let prev = self.last_sale_count.replace(count);
        match prev {
            Some(p) if count > p => Some(Alert::NewSales {
                machine_id: self.machine_id.clone(),
                new_count: count,
            }),
            _ => None,
        }
    }

    /// Observe cabinet temperature against the configured ceiling.
    /// Edge-triggered in both directions: one alert on crossing above,
    /// one recovery on crossing back below.
    pub fn observe_temperature(&mut self, temp_c: f64, max_c: f64) -> Option<Alert> {
        if temp_c > max_c && !self.temp_alert_active {
            self.temp_alert_active = true;
            return Some(Alert::TempHigh {
                machine_id: self.machine_id.clone(),
                temp_c,
                max_c,
            });
        }
        if temp_c <= max_c && self.temp_alert_active {
            self.temp_alert_active = false;
            return Some(Alert::TempRecovered {
                machine_id: self.machine_id.clone(),
                temp_c,
            });
        }
        None
    }

    /// Observe one stock row. Alerts once when the row drops to or below
    /// its threshold; re-arms after the row recovers (refill).
    pub fn observe_stock(&mut self, item: &StockItem) -> Option<Alert> {
        if item.is_low() {
            if self.low_positions.insert(item.position) {
                return Some(Alert::LowStock {
                    machine_id: self.machine_id.clone(),
                    position: item.position,
                    units: item.units_current,
                    threshold: item.alert_threshold,
                });
            }
        } else {
            self.low_positions.remove(&item.position);
        }
        None
    }
}
