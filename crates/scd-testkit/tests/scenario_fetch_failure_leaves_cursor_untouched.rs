//! Scenario: a transient fetch failure loses nothing.
//!
//! # Invariant under test
//! A ledger fetch error aborts the pass with the cursor untouched; the
//! next successful pass picks up every sale that arrived during the
//! outage. Failures are retried by the next tick, never terminal.

use scd_sync::{run_pass, Watermarks};
use scd_testkit::{sale, MemStore, ScriptedVendor};

#[tokio::test]
async fn outage_then_recovery_applies_all_missed_sales() {
    let store = MemStore::new();
    let vendor = ScriptedVendor::new();
    let wms = Watermarks::new();

    store.seed_stock("M-1", 1, 30, 100);
    vendor.push_sale("M-1", sale("s1", &[]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    // Upstream goes dark while sales keep accumulating.
    vendor.set_fail_fetch(true);
    vendor.push_sale("M-1", sale("s2", &[(1, 2)]));
    vendor.push_sale("M-1", sale("s3", &[(1, 1)]));

    for _ in 0..3 {
        let err = run_pass(&store, &vendor, &wms, "M-1").await.unwrap_err();
        assert!(err.to_string().contains("ledger fetch failed"));
    }
    assert_eq!(store.cursor("M-1").unwrap().last_sale_id, "s1", "cursor held");
    assert_eq!(store.units("M-1", 1), Some(30), "nothing applied blind");

    // Recovery: one pass catches up on the whole backlog.
    vendor.set_fail_fetch(false);
    let report = run_pass(&store, &vendor, &wms, "M-1").await.unwrap();
    assert_eq!(report.applied_sales, 2);
    assert_eq!(store.units("M-1", 1), Some(27));
    assert_eq!(store.cursor("M-1").unwrap().last_sale_id, "s3");
}

#[tokio::test]
async fn partial_decrement_failure_does_not_block_other_positions() {
    let store = MemStore::new();
    let vendor = ScriptedVendor::new();
    let wms = Watermarks::new();

    store.seed_stock("M-1", 1, 10, 100);
    store.seed_stock("M-1", 2, 10, 100);
    store.seed_stock("M-1", 3, 10, 100);
    store.fail_decrements_for(2);

    vendor.push_sale("M-1", sale("s1", &[]));
    run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    vendor.push_sale("M-1", sale("s2", &[(1, 1), (2, 1), (3, 1)]));
    let report = run_pass(&store, &vendor, &wms, "M-1").await.unwrap();

    // Position 2's deduction is lost (accepted risk); 1 and 3 applied.
    assert_eq!(report.deducted_positions, 2);
    assert_eq!(report.failed_positions, 1);
    assert_eq!(store.units("M-1", 1), Some(9));
    assert_eq!(store.units("M-1", 2), Some(10));
    assert_eq!(store.units("M-1", 3), Some(9));

    // The pass still completed: cursor advanced, no replay next time.
    assert_eq!(store.cursor("M-1").unwrap().last_sale_id, "s2");
    let report = run_pass(&store, &vendor, &wms, "M-1").await.unwrap();
    assert_eq!(report.applied_sales, 0);
}
