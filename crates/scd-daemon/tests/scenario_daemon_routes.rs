//! In-process scenario tests for scd-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` against the in-memory testkit
//! store/ledger and drives it via `tower::ServiceExt::oneshot` — no
//! network or database required.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use scd_daemon::{routes, state};
use scd_sync::SyncLoopConfig;
use scd_testkit::{sale, MemStore, ScriptedVendor};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type TestState = state::AppState<MemStore, ScriptedVendor>;

/// Fresh state over the in-memory store and a scripted vendor. The loop
/// period is long so periodic ticks never race a test's assertions.
fn make_state() -> Arc<TestState> {
    let config = SyncLoopConfig {
        period: Duration::from_secs(3600),
        ..SyncLoopConfig::default()
    };
    Arc::new(state::AppState::new(
        Arc::new(MemStore::new()),
        Arc::new(ScriptedVendor::new()),
        config,
    ))
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

/// Parse body bytes as a `serde_json::Value`.
fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = routes::build_router(make_state());

    let (status, body) = call(router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "scd-daemon");
}

// ---------------------------------------------------------------------------
// POST /v1/machines + GET /v1/machines + GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_starts_loop_and_shows_in_status() {
    let st = make_state();

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            "/v1/machines",
            r#"{"machine_id":"M-1","display_name":"Pier kiosk","location":"Pier 7"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(parse_json(body)["machine_id"], "M-1");

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/machines")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["machines"][0]["machine_id"], "M-1");
    assert_eq!(json["machines"][0]["active"], true);

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["tracked_machines"], 1);
    assert_eq!(json["machines"][0]["loop_running"], true);
}

#[tokio::test]
async fn inactive_registration_records_machine_without_loop() {
    let st = make_state();

    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            "/v1/machines",
            r#"{"machine_id":"M-1","display_name":"Depot spare","active":false}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    let json = parse_json(body);
    assert_eq!(json["tracked_machines"], 0);
    assert_eq!(json["machines"][0]["active"], false);
    assert_eq!(json["machines"][0]["loop_running"], false);
}

// ---------------------------------------------------------------------------
// POST /v1/machines/:id/deactivate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deactivate_stops_the_loop() {
    let st = make_state();

    let _ = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            "/v1/machines",
            r#"{"machine_id":"M-1","display_name":"Pier kiosk"}"#,
        ),
    )
    .await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/deactivate"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["loop_stopped"], true);

    let (_, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    let json = parse_json(body);
    assert_eq!(json["tracked_machines"], 0);
    assert_eq!(json["machines"][0]["active"], false);
}

// ---------------------------------------------------------------------------
// GET /v1/machines/:id/stock + POST /v1/machines/:id/refill
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stock_and_refill_round_trip() {
    let st = make_state();
    st.store.seed_stock("M-1", 1, 5, 100);
    st.store.seed_stock("M-1", 2, 80, 100);

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/machines/M-1/stock"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["items"][0]["position"], 1);
    assert_eq!(json["items"][0]["units_current"], 5);

    // Refill one position only.
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/v1/machines/M-1/refill", r#"{"position":1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["items"][0]["units_current"], 100);
    assert_eq!(json["items"][1]["units_current"], 80, "other slot untouched");

    // Empty body refills the whole machine.
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/v1/machines/M-1/refill", "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["items"][1]["units_current"], 100);
}

// ---------------------------------------------------------------------------
// POST /v1/machines/:id/sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_sync_returns_pass_report() {
    let st = make_state();
    st.store.seed_stock("M-1", 1, 45, 100);
    st.ledger.push_sale("M-1", sale("s1", &[(1, 1)]));

    // First pass: baseline.
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/sync"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["report"]["kind"], "baseline");
    assert_eq!(json["report"]["applied_sales"], 0);

    // Second pass applies the new sale.
    st.ledger.push_sale("M-1", sale("s2", &[(1, 2)]));
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/sync"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["report"]["kind"], "incremental");
    assert_eq!(json["report"]["cursor"], "s2");

    let (_, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/machines/M-1/stock"),
    )
    .await;
    assert_eq!(parse_json(body)["items"][0]["units_current"], 43);
}

#[tokio::test]
async fn concurrent_manual_sync_is_409() {
    let st = make_state();
    st.store.seed_stock("M-1", 1, 45, 100);
    st.ledger.push_sale("M-1", sale("s1", &[]));
    st.ledger.set_fetch_delay(Duration::from_millis(200));

    let slow = tokio::spawn(call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/sync"),
    ));
    // Let the slow pass take the guard before firing the second trigger.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/sync"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["machine_id"], "M-1");

    let (status, _) = slow.await.unwrap();
    assert_eq!(status, StatusCode::OK, "the first trigger still completes");
}

#[tokio::test]
async fn failed_sync_returns_500_and_holds_cursor() {
    let st = make_state();
    st.store.seed_stock("M-1", 1, 45, 100);
    st.ledger.set_fail_fetch(true);

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post("/v1/machines/M-1/sync"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("ledger fetch failed"));
    assert!(st.store.cursor("M-1").is_none());
}

// ---------------------------------------------------------------------------
// Unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let router = routes::build_router(make_state());
    let (status, _) = call(router, get("/v1/does_not_exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
