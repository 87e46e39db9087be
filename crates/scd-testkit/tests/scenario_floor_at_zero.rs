//! Scenario: stock never goes negative.
//!
//! # Invariant under test
//! When accumulated consumption exceeds `units_current`, the counter
//! lands at exactly 0 — never below — and later refill/deduction cycles
//! behave normally from there.

use scd_sync::{run_pass, StockStore, Watermarks};
use scd_testkit::{sale, MemStore, ScriptedVendor};

#[tokio::test]
async fn oversized_consumption_floors_at_zero() {
    let store = MemStore::new();
    let vendor = ScriptedVendor::new();
    let wms = Watermarks::new();

    store.seed_stock("M-1", 1, 3, 100);
    vendor.push_sale("M-1", sale("s1", &[]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    vendor.push_sale("M-1", sale("s2", &[(1, 10)]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    assert_eq!(store.units("M-1", 1), Some(0), "floored, not negative");
}

#[tokio::test]
async fn floor_is_per_pass_cumulative_and_recoverable() {
    let store = MemStore::new();
    let vendor = ScriptedVendor::new();
    let wms = Watermarks::new();

    store.seed_stock("M-1", 1, 5, 100);
    vendor.push_sale("M-1", sale("s1", &[]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    // Two sales in one window: 4 + 4 > 5.
    vendor.push_sale("M-1", sale("s2", &[(1, 4)]));
    vendor.push_sale("M-1", sale("s3", &[(1, 4)]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();
    assert_eq!(store.units("M-1", 1), Some(0));

    // Refill resets to capacity; reconciliation continues normally.
    store.refill("M-1", Some(1)).await.unwrap();
    vendor.push_sale("M-1", sale("s4", &[(1, 2)]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();
    assert_eq!(store.units("M-1", 1), Some(98));
}
