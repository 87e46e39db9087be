//! Axum router and all HTTP handlers for scd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use scd_schemas::Machine;
use scd_sync::{run_guarded_pass, SalesLedger, StockStore, SyncEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, MachineStatus, MachinesResponse, RefillRequest,
        RegisterMachineRequest, StatusResponse, StockResponse, SyncBusyResponse, SyncResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router<S, L>(state: Arc<AppState<S, L>>) -> Router
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    Router::new()
        .route("/v1/health", get(health::<S, L>))
        .route("/v1/status", get(status_handler::<S, L>))
        .route("/v1/stream", get(stream::<S, L>))
        .route(
            "/v1/machines",
            get(machines_list::<S, L>).post(machines_register::<S, L>),
        )
        .route("/v1/machines/:machine_id/stock", get(stock::<S, L>))
        .route("/v1/machines/:machine_id/refill", post(refill::<S, L>))
        .route("/v1/machines/:machine_id/sync", post(sync_now::<S, L>))
        .route(
            "/v1/machines/:machine_id/deactivate",
            post(deactivate::<S, L>),
        )
        .with_state(state)
}

/// 500 with a JSON error body; the full chain goes to the log, not the wire.
fn internal_error(err: anyhow::Error) -> Response {
    error!(err = format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health<S, L>(State(st): State<Arc<AppState<S, L>>>) -> impl IntoResponse
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler<S, L>(State(st): State<Arc<AppState<S, L>>>) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    let machines = match st.store.list_machines().await {
        Ok(m) => m,
        Err(err) => return internal_error(err),
    };

    let mut statuses = Vec::with_capacity(machines.len());
    for m in &machines {
        let cursor = match st.store.get_cursor(&m.machine_id).await {
            Ok(c) => c,
            Err(err) => return internal_error(err),
        };
        statuses.push(MachineStatus {
            machine_id: m.machine_id.clone(),
            active: m.active,
            loop_running: st.loop_running(&m.machine_id).await,
            in_flight: st.guard.is_running(&m.machine_id),
            last_synced_at: cursor.map(|c| c.last_synced_at),
        });
    }

    let tracked = statuses.iter().filter(|s| s.loop_running).count();
    (
        StatusCode::OK,
        Json(StatusResponse {
            service: st.build.service,
            version: st.build.version,
            daemon_uptime_secs: uptime_secs(),
            tracked_machines: tracked,
            machines: statuses,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/machines
// ---------------------------------------------------------------------------

pub(crate) async fn machines_list<S, L>(State(st): State<Arc<AppState<S, L>>>) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    match st.store.list_machines().await {
        Ok(machines) => (StatusCode::OK, Json(MachinesResponse { machines })).into_response(),
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/machines
// ---------------------------------------------------------------------------

/// Register (or re-register) a machine. An active machine gets its
/// periodic sync loop started immediately.
pub(crate) async fn machines_register<S, L>(
    State(st): State<Arc<AppState<S, L>>>,
    Json(req): Json<RegisterMachineRequest>,
) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    let machine = Machine {
        machine_id: req.machine_id,
        display_name: req.display_name,
        location: req.location,
        active: req.active,
        owner_id: req.owner_id,
    };

    if let Err(err) = st.store.register_machine(&machine).await {
        return internal_error(err);
    }

    if machine.active {
        st.start_loop(&machine.machine_id).await;
    }

    info!(machine_id = %machine.machine_id, active = machine.active, "machine registered");
    (StatusCode::CREATED, Json(machine)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/machines/:id/deactivate
// ---------------------------------------------------------------------------

/// Mark the machine inactive and stop its sync loop. The in-flight pass
/// (if any) finishes; its stock rows and cursor stay in place.
pub(crate) async fn deactivate<S, L>(
    State(st): State<Arc<AppState<S, L>>>,
    Path(machine_id): Path<String>,
) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    if let Err(err) = st.store.set_machine_active(&machine_id, false).await {
        return internal_error(err);
    }
    let stopped = st.stop_loop(&machine_id).await;

    info!(machine_id, stopped, "machine deactivated");
    (
        StatusCode::OK,
        Json(serde_json::json!({ "machine_id": machine_id, "loop_stopped": stopped })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/machines/:id/stock
// ---------------------------------------------------------------------------

pub(crate) async fn stock<S, L>(
    State(st): State<Arc<AppState<S, L>>>,
    Path(machine_id): Path<String>,
) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    match st.store.list_stock(&machine_id).await {
        Ok(items) => (StatusCode::OK, Json(StockResponse { machine_id, items })).into_response(),
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/machines/:id/refill
// ---------------------------------------------------------------------------

/// Reset one slot (or every slot) to capacity and return the new rows.
pub(crate) async fn refill<S, L>(
    State(st): State<Arc<AppState<S, L>>>,
    Path(machine_id): Path<String>,
    Json(req): Json<RefillRequest>,
) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    if let Err(err) = st.store.refill(&machine_id, req.position).await {
        return internal_error(err);
    }

    info!(machine_id, position = ?req.position, "refill applied");
    match st.store.list_stock(&machine_id).await {
        Ok(items) => (StatusCode::OK, Json(StockResponse { machine_id, items })).into_response(),
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/machines/:id/sync
// ---------------------------------------------------------------------------

/// Manual one-shot reconciliation pass.
///
/// Returns `409 Conflict` when a pass for this machine is already in
/// flight (periodic tick or another manual trigger); the caller retries
/// later instead of queuing.
pub(crate) async fn sync_now<S, L>(
    State(st): State<Arc<AppState<S, L>>>,
    Path(machine_id): Path<String>,
) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    match run_guarded_pass(
        &*st.store,
        &*st.ledger,
        &st.guard,
        &st.watermarks,
        &machine_id,
    )
    .await
    {
        Ok(Some(report)) => {
            let _ = st.events.send(SyncEvent::PassCompleted {
                report: report.clone(),
            });
            (StatusCode::OK, Json(SyncResponse { report })).into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(SyncBusyResponse {
                error: "a reconciliation pass is already in flight".to_string(),
                machine_id,
            }),
        )
            .into_response(),
        Err(err) => {
            let _ = st.events.send(SyncEvent::PassFailed {
                machine_id: machine_id.clone(),
                error: err.to_string(),
            });
            internal_error(err)
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream<S, L>(State(st): State<Arc<AppState<S, L>>>) -> Response
where
    S: StockStore + 'static,
    L: SalesLedger + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Sync(SyncEvent::Alert { .. }) => "alert",
                    BusMsg::Sync(_) => "sync",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
