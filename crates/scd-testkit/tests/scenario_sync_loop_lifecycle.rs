//! Scenario: the periodic sync loop, start to stop.
//!
//! # Invariant under test
//! A spawned loop initializes stock rows from the machine layout, runs
//! guarded passes on its period, emits pass events on the bus, and on
//! stop lets the in-flight pass finish without scheduling further ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scd_schemas::Telemetry;
use scd_sync::{spawn_sync_loop, Alert, InFlightGuard, SyncEvent, SyncLoopConfig, Watermarks};
use scd_testkit::{sale, MemStore, ScriptedVendor};
use tokio::sync::broadcast;

fn fast_config() -> SyncLoopConfig {
    SyncLoopConfig {
        period: Duration::from_millis(10),
        ..SyncLoopConfig::default()
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event within 2s")
        .expect("event bus closed")
}

#[tokio::test]
async fn loop_initializes_layout_and_reconciles_on_ticks() {
    let store = Arc::new(MemStore::new());
    let vendor = Arc::new(ScriptedVendor::new());
    let (events, mut rx) = broadcast::channel(64);

    vendor.set_layout("M-1", vec![1, 2, 3]);
    vendor.push_sale("M-1", sale("s1", &[(1, 1)]));

    let handle = spawn_sync_loop(
        Arc::clone(&store),
        Arc::clone(&vendor),
        InFlightGuard::new(),
        Watermarks::new(),
        events,
        "M-1".to_string(),
        fast_config(),
    );

    // First tick: baseline pass over the pre-existing sale.
    loop {
        if let SyncEvent::PassCompleted { report } = next_event(&mut rx).await {
            assert_eq!(report.applied_sales, 0);
            break;
        }
    }
    assert_eq!(store.tracked_positions("M-1"), vec![1, 2, 3]);
    assert_eq!(store.cursor("M-1").unwrap().last_sale_id, "s1");

    // A new sale lands; some later tick applies it.
    vendor.push_sale("M-1", sale("s2", &[(2, 3)]));
    loop {
        if let SyncEvent::PassCompleted { report } = next_event(&mut rx).await {
            if report.applied_sales > 0 {
                assert_eq!(report.cursor.as_deref(), Some("s2"));
                break;
            }
        }
    }
    assert_eq!(store.units("M-1", 2), Some(97));

    handle.shutdown().await;
}

#[tokio::test]
async fn stop_lets_in_flight_pass_finish_and_halts_ticks() {
    let store = Arc::new(MemStore::new());
    let vendor = Arc::new(ScriptedVendor::new());
    let (events, mut rx) = broadcast::channel(64);

    store.seed_stock("M-1", 1, 50, 100);
    vendor.push_sale("M-1", sale("s1", &[]));

    let handle = spawn_sync_loop(
        Arc::clone(&store),
        Arc::clone(&vendor),
        InFlightGuard::new(),
        Watermarks::new(),
        events,
        "M-1".to_string(),
        fast_config(),
    );

    loop {
        if matches!(next_event(&mut rx).await, SyncEvent::PassCompleted { .. }) {
            break;
        }
    }

    handle.shutdown().await;

    // The loop is gone: a sale arriving now is never picked up.
    vendor.push_sale("M-1", sale("s2", &[(1, 5)]));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.units("M-1", 1), Some(50));
    assert_eq!(store.cursor("M-1").unwrap().last_sale_id, "s1");
}

#[tokio::test]
async fn loop_emits_temperature_alerts_edge_triggered() {
    let store = Arc::new(MemStore::new());
    let vendor = Arc::new(ScriptedVendor::new());
    let (events, mut rx) = broadcast::channel(64);

    vendor.push_sale("M-1", sale("s1", &[]));
    vendor.set_telemetry(Telemetry {
        machine_id: "M-1".to_string(),
        cabinet_temp_c: -5.0,
        sale_count_today: 1,
        captured_at_utc: Utc::now(),
    });

    let handle = spawn_sync_loop(
        Arc::clone(&store),
        Arc::clone(&vendor),
        InFlightGuard::new(),
        Watermarks::new(),
        events,
        "M-1".to_string(),
        fast_config(),
    );

    // -5 °C against the -12 °C ceiling raises exactly one alert.
    loop {
        if let SyncEvent::Alert { alert } = next_event(&mut rx).await {
            assert!(matches!(alert, Alert::TempHigh { .. }));
            break;
        }
    }

    // Back in range: the recovery edge fires, then silence.
    vendor.set_telemetry(Telemetry {
        machine_id: "M-1".to_string(),
        cabinet_temp_c: -18.0,
        sale_count_today: 1,
        captured_at_utc: Utc::now(),
    });
    loop {
        if let SyncEvent::Alert { alert } = next_event(&mut rx).await {
            assert!(matches!(alert, Alert::TempRecovered { .. }));
            break;
        }
    }

    handle.shutdown().await;
}
