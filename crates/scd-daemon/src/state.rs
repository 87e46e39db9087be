//! Shared runtime state for scd-daemon.
//!
//! Handlers receive `State<Arc<AppState<S, L>>>` from Axum. The state is
//! generic over the store and ledger seams so the scenario tests can run
//! the full router against the in-memory testkit implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scd_sync::{
    spawn_sync_loop, InFlightGuard, SalesLedger, StockStore, SyncEvent, SyncLoopConfig,
    SyncLoopHandle, Watermarks,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Sync(SyncEvent),
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handle behind `Arc`, one per daemon process.
///
/// The sync loops, manual sync triggers and status queries all observe the
/// same [`InFlightGuard`] and [`Watermarks`], so guard semantics hold no
/// matter where a pass was triggered from.
pub struct AppState<S, L> {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    pub store: Arc<S>,
    pub ledger: Arc<L>,
    pub guard: InFlightGuard,
    pub watermarks: Watermarks,
    /// Raw sync-event channel the per-machine loops publish to; a
    /// forwarder task re-wraps these onto `bus`.
    pub events: broadcast::Sender<SyncEvent>,
    /// Running per-machine loops, keyed by machine id.
    pub loops: RwLock<HashMap<String, SyncLoopHandle>>,
    pub loop_config: SyncLoopConfig,
}

impl<S, L> AppState<S, L>
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, loop_config: SyncLoopConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let (events, _rx) = broadcast::channel::<SyncEvent>(1024);

        Self {
            bus,
            build: BuildInfo {
                service: "scd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            store,
            ledger,
            guard: InFlightGuard::new(),
            watermarks: Watermarks::new(),
            events,
            loops: RwLock::new(HashMap::new()),
            loop_config,
        }
    }

    /// Start the periodic loop for one machine. A second start for a
    /// machine whose loop is already running is a no-op.
    pub async fn start_loop(&self, machine_id: &str) {
        let mut loops = self.loops.write().await;
        if let Some(existing) = loops.get(machine_id) {
            if !existing.is_finished() {
                return;
            }
        }
        let handle = spawn_sync_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.ledger),
            self.guard.clone(),
            self.watermarks.clone(),
            self.events.clone(),
            machine_id.to_string(),
            self.loop_config,
        );
        loops.insert(machine_id.to_string(), handle);
        info!(machine_id, "sync loop registered");
    }

    /// Stop and remove one machine's loop. Returns false when no loop
    /// was running. The in-flight pass (if any) finishes first.
    pub async fn stop_loop(&self, machine_id: &str) -> bool {
        let handle = self.loops.write().await.remove(machine_id);
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                info!(machine_id, "sync loop stopped");
                true
            }
            None => false,
        }
    }

    pub async fn loop_running(&self, machine_id: &str) -> bool {
        self.loops
            .read()
            .await
            .get(machine_id)
            .is_some_and(|h| !h.is_finished())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task forwarding sync-loop events onto the SSE bus.
pub fn spawn_event_forwarder(events: broadcast::Sender<SyncEvent>, bus: broadcast::Sender<BusMsg>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let _ = bus.send(BusMsg::Sync(ev));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
