use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use scd_schemas::{
    Machine, StockItem, SyncCursor, DEFAULT_ALERT_THRESHOLD, DEFAULT_CAPACITY,
};
use scd_sync::StockStore;

#[derive(Default)]
struct Inner {
    stock: BTreeMap<(String, i32), StockItem>,
    cursors: BTreeMap<String, SyncCursor>,
    machines: BTreeMap<String, Machine>,
    /// Positions whose decrement is scripted to fail.
    failing_positions: BTreeSet<i32>,
}

/// In-memory [`StockStore`] with the same update semantics as the
/// Postgres implementation.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one stock row directly (bypasses layout init).
    pub fn seed_stock(&self, machine_id: &str, position: i32, units: i64, capacity: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.stock.insert(
            (machine_id.to_string(), position),
            StockItem {
                machine_id: machine_id.to_string(),
                position,
                units_current: units,
                capacity_max: capacity,
                alert_threshold: DEFAULT_ALERT_THRESHOLD,
            },
        );
    }

    /// Script decrement failures for one position (partial-application tests).
    pub fn fail_decrements_for(&self, position: i32) {
        self.inner.lock().unwrap().failing_positions.insert(position);
    }

    pub fn units(&self, machine_id: &str, position: i32) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .stock
            .get(&(machine_id.to_string(), position))
            .map(|item| item.units_current)
    }

    pub fn cursor(&self, machine_id: &str) -> Option<SyncCursor> {
        self.inner.lock().unwrap().cursors.get(machine_id).cloned()
    }

    pub fn tracked_positions(&self, machine_id: &str) -> Vec<i32> {
        let inner = self.inner.lock().unwrap();
        inner
            .stock
            .keys()
            .filter(|(m, _)| m == machine_id)
            .map(|&(_, p)| p)
            .collect()
    }
}

impl StockStore for MemStore {
    async fn get_cursor(&self, machine_id: &str) -> Result<Option<SyncCursor>> {
        Ok(self.cursor(machine_id))
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .cursors
            .insert(cursor.machine_id.clone(), cursor.clone());
        Ok(())
    }

    async fn list_stock(&self, machine_id: &str) -> Result<Vec<StockItem>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stock
            .values()
            .filter(|item| item.machine_id == machine_id)
            .cloned()
            .collect())
    }

    async fn decrement_units(&self, machine_id: &str, position: i32, by: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_positions.contains(&position) {
            bail!("scripted decrement failure for position {position}");
        }
        // Same contract as the SQL: floor at zero against the live row;
        // a missing row is untracked, not an error.
        if let Some(item) = inner.stock.get_mut(&(machine_id.to_string(), position)) {
            item.units_current = (item.units_current - by).max(0);
        }
        Ok(())
    }

    async fn refill(&self, machine_id: &str, position: Option<i32>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for item in inner.stock.values_mut() {
            if item.machine_id != machine_id {
                continue;
            }
            if position.is_none() || position == Some(item.position) {
                item.units_current = item.capacity_max;
            }
        }
        Ok(())
    }

    async fn init_layout(&self, machine_id: &str, positions: &[i32]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for &position in positions {
            inner
                .stock
                .entry((machine_id.to_string(), position))
                .or_insert_with(|| StockItem {
                    machine_id: machine_id.to_string(),
                    position,
                    units_current: DEFAULT_CAPACITY,
                    capacity_max: DEFAULT_CAPACITY,
                    alert_threshold: DEFAULT_ALERT_THRESHOLD,
                });
        }
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<Machine>> {
        Ok(self.inner.lock().unwrap().machines.values().cloned().collect())
    }

    async fn register_machine(&self, machine: &Machine) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .machines
            .insert(machine.machine_id.clone(), machine.clone());
        Ok(())
    }

    async fn set_machine_active(&self, machine_id: &str, active: bool) -> Result<()> {
        if let Some(m) = self.inner.lock().unwrap().machines.get_mut(machine_id) {
            m.active = active;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_operates_on_the_live_row_after_refill() {
        // A refill between snapshot read and decrement must be decremented
        // from, not overwritten by a stale snapshot value.
        let store = MemStore::new();
        store.seed_stock("M-1", 1, 3, 100);

        store.refill("M-1", Some(1)).await.unwrap();
        store.decrement_units("M-1", 1, 2).await.unwrap();

        assert_eq!(store.units("M-1", 1), Some(98));
    }

    #[tokio::test]
    async fn layout_init_never_resets_existing_rows() {
        let store = MemStore::new();
        store.seed_stock("M-1", 1, 7, 50);

        store.init_layout("M-1", &[1, 2]).await.unwrap();

        assert_eq!(store.units("M-1", 1), Some(7), "existing row untouched");
        assert_eq!(store.units("M-1", 2), Some(DEFAULT_CAPACITY));
    }
}
