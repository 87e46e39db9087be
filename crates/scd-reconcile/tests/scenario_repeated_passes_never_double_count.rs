//! Scenario: repeated reconciliation passes never double-count.
//!
//! # Invariant under test
//! For any sequence of passes over a fixed, non-rotating ledger, the
//! cumulative quantity deducted per topping equals the sum of consumption
//! for all sales after the baseline pass — regardless of how many
//! intermediate passes ran or how often the same window was re-fetched.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use scd_reconcile::plan;
use scd_schemas::{Sale, SyncCursor, ToppingConsumption};

fn sale(id: &str, toppings: &[(i32, i64)]) -> Sale {
    Sale {
        sale_id: id.to_string(),
        ts_utc: Utc.timestamp_opt(1_750_000_000, 0).unwrap(),
        product: "choc-sundae".to_string(),
        price_cents: 420,
        toppings: toppings
            .iter()
            .map(|&(position, qty)| ToppingConsumption { position, qty })
            .collect(),
    }
}

/// Drive one pass and fold its deductions into `total`, advancing the
/// cursor exactly as a pass runner would.
fn run_pass(
    cursor: &mut Option<SyncCursor>,
    window: &[Sale],
    total: &mut BTreeMap<i32, i64>,
) {
    let p = plan(cursor.as_ref(), window);
    for (pos, qty) in &p.deductions {
        *total.entry(*pos).or_insert(0) += qty;
    }
    if let Some(adv) = p.advance {
        *cursor = Some(SyncCursor {
            machine_id: "M-1".to_string(),
            last_sale_id: adv.last_sale_id,
            last_synced_at: Utc::now(),
        });
    }
}

#[test]
fn growing_ledger_deducts_each_sale_exactly_once() {
    let mut ledger = vec![sale("s1", &[(1, 1)]), sale("s2", &[(1, 1), (2, 2)])];
    let mut cursor: Option<SyncCursor> = None;
    let mut total = BTreeMap::new();

    // Baseline: cursor established, nothing deducted.
    run_pass(&mut cursor, &ledger, &mut total);
    assert!(total.is_empty());
    assert_eq!(cursor.as_ref().unwrap().last_sale_id, "s2");

    // Three redundant passes over the unchanged window: still nothing.
    for _ in 0..3 {
        run_pass(&mut cursor, &ledger, &mut total);
    }
    assert!(total.is_empty(), "unchanged ledger must be a no-op");

    // New sales arrive, interleaved with redundant re-fetches.
    ledger.push(sale("s3", &[(1, 2)]));
    run_pass(&mut cursor, &ledger, &mut total);
    run_pass(&mut cursor, &ledger, &mut total); // re-fetch, no new sales

    ledger.push(sale("s4", &[(2, 1)]));
    ledger.push(sale("s5", &[(1, 1), (2, 1)]));
    run_pass(&mut cursor, &ledger, &mut total);
    run_pass(&mut cursor, &ledger, &mut total);
    run_pass(&mut cursor, &ledger, &mut total);

    // Only s3..s5 count: s1/s2 predate the baseline cursor.
    assert_eq!(total.get(&1), Some(&3)); // s3:2 + s5:1
    assert_eq!(total.get(&2), Some(&2)); // s4:1 + s5:1
    assert_eq!(cursor.unwrap().last_sale_id, "s5");
}

#[test]
fn pass_count_does_not_change_the_outcome() {
    // Same ledger growth, two different pass cadences, identical totals.
    let final_ledger = vec![
        sale("s1", &[(7, 1)]),
        sale("s2", &[(7, 1)]),
        sale("s3", &[(7, 2)]),
        sale("s4", &[(8, 5)]),
    ];

    // Cadence A: a pass after every single sale.
    let mut cur_a: Option<SyncCursor> = None;
    let mut tot_a = BTreeMap::new();
    for n in 1..=final_ledger.len() {
        run_pass(&mut cur_a, &final_ledger[..n], &mut tot_a);
    }

    // Cadence B: baseline on the first sale, then one catch-up pass.
    let mut cur_b: Option<SyncCursor> = None;
    let mut tot_b = BTreeMap::new();
    run_pass(&mut cur_b, &final_ledger[..1], &mut tot_b);
    run_pass(&mut cur_b, &final_ledger, &mut tot_b);

    assert_eq!(tot_a, tot_b);
    assert_eq!(tot_a.get(&7), Some(&3)); // s2 + s3; s1 is the baseline
    assert_eq!(tot_a.get(&8), Some(&5));
}
