//! Per-machine periodic sync loops.
//!
//! One tokio task per tracked machine. Each loop:
//! - observes the machine's topping layout once at start (lazy stock-row
//!   creation happens here, never mid-pass);
//! - runs a guarded reconciliation pass per tick;
//! - sweeps telemetry and stock for edge-triggered alerts;
//! - stops on its watch-channel signal. An in-flight pass finishes;
//!   no further ticks are scheduled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerts::AlertState;
use crate::guard::InFlightGuard;
use crate::runner::{run_guarded_pass, SyncEvent, Watermarks};
use crate::traits::{SalesLedger, StockStore};

/// Tunables for one sync loop.
#[derive(Debug, Clone, Copy)]
pub struct SyncLoopConfig {
    /// Time between reconciliation ticks.
    pub period: Duration,
    /// Cabinet temperature alert ceiling, °C.
    pub temp_max_c: f64,
}

impl Default for SyncLoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
            temp_max_c: -12.0,
        }
    }
}

/// Handle to one machine's running sync loop.
///
/// Dropping the handle also stops the loop (the stop channel closes).
pub struct SyncLoopHandle {
    machine_id: String,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SyncLoopHandle {
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Signal the loop to stop after any in-flight pass completes.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// True once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop and wait for the loop task to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.join.await;
    }
}

/// Spawn the periodic sync loop for one machine.
pub fn spawn_sync_loop<S, L>(
    store: Arc<S>,
    ledger: Arc<L>,
    guard: InFlightGuard,
    watermarks: Watermarks,
    events: broadcast::Sender<SyncEvent>,
    machine_id: String,
    config: SyncLoopConfig,
) -> SyncLoopHandle
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let loop_machine_id = machine_id.clone();

    let join = tokio::spawn(async move {
        let machine_id = loop_machine_id;

        // Observe the topping layout once so stock rows exist before the
        // first pass. Failure is not fatal: untracked positions are
        // skipped until a later loop start succeeds.
        match ledger.fetch_layout(&machine_id).await {
            Ok(positions) => {
                if let Err(err) = store.init_layout(&machine_id, &positions).await {
                    warn!(machine_id, %err, "layout init failed");
                }
            }
            Err(err) => warn!(machine_id, %err, "layout fetch failed"),
        }

        let mut alerts = AlertState::new(&machine_id);
        let mut ticker = tokio::time::interval(config.period);
        // Overlap is handled by the in-flight guard; a slow pass must not
        // be followed by a burst of catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(machine_id, period_secs = config.period.as_secs(), "sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match run_guarded_pass(&*store, &*ledger, &guard, &watermarks, &machine_id).await {
                Ok(Some(report)) => {
                    let _ = events.send(SyncEvent::PassCompleted { report });
                }
                Ok(None) => {
                    let _ = events.send(SyncEvent::PassSkipped {
                        machine_id: machine_id.clone(),
                    });
                }
                Err(err) => {
                    warn!(machine_id, %err, "reconciliation pass failed; will retry next tick");
                    let _ = events.send(SyncEvent::PassFailed {
                        machine_id: machine_id.clone(),
                        error: err.to_string(),
                    });
                }
            }

            sweep_alerts(&*store, &*ledger, &mut alerts, config.temp_max_c, &events).await;
        }

        debug!(machine_id, "sync loop stopped");
    });

    SyncLoopHandle {
        machine_id,
        stop: stop_tx,
        join,
    }
}

/// Best-effort alert sweep: telemetry and stock reads may fail without
/// affecting reconciliation; throttle state only advances on data we
/// actually observed.
async fn sweep_alerts<S, L>(
    store: &S,
    ledger: &L,
    alerts: &mut AlertState,
    temp_max_c: f64,
    events: &broadcast::Sender<SyncEvent>,
) where
    S: StockStore,
    L: SalesLedger,
{
    let machine_id = alerts.machine_id().to_string();

    match ledger.fetch_telemetry(&machine_id).await {
        Ok(tele) => {
            if let Some(alert) = alerts.observe_sale_count(tele.sale_count_today) {
                let _ = events.send(SyncEvent::Alert { alert });
            }
            if let Some(alert) = alerts.observe_temperature(tele.cabinet_temp_c, temp_max_c) {
                let _ = events.send(SyncEvent::Alert { alert });
            }
        }
        Err(err) => debug!(machine_id, %err, "telemetry fetch failed"),
    }

    match store.list_stock(&machine_id).await {
        Ok(items) => {
            for item in &items {
                if let Some(alert) = alerts.observe_stock(item) {
                    let _ = events.send(SyncEvent::Alert { alert });
                }
            }
        }
        Err(err) => debug!(machine_id, %err, "stock read failed during alert sweep"),
    }
}
