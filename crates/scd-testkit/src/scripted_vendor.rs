use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use scd_schemas::{Sale, Telemetry};
use scd_sync::SalesLedger;

#[derive(Default)]
struct Inner {
    windows: BTreeMap<String, Vec<Sale>>,
    layouts: BTreeMap<String, Vec<i32>>,
    telemetry: BTreeMap<String, Telemetry>,
    fail_fetch: bool,
    fetch_delay: Option<Duration>,
}

/// In-memory [`SalesLedger`] serving scripted sale windows.
#[derive(Default)]
pub struct ScriptedVendor {
    inner: Mutex<Inner>,
}

impl ScriptedVendor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sale to the machine's window (upstream append order).
    pub fn push_sale(&self, machine_id: &str, sale: Sale) {
        self.inner
            .lock()
            .unwrap()
            .windows
            .entry(machine_id.to_string())
            .or_default()
            .push(sale);
    }

    /// Replace the machine's whole window (ledger rotation).
    pub fn set_window(&self, machine_id: &str, sales: Vec<Sale>) {
        self.inner
            .lock()
            .unwrap()
            .windows
            .insert(machine_id.to_string(), sales);
    }

    pub fn set_layout(&self, machine_id: &str, positions: Vec<i32>) {
        self.inner
            .lock()
            .unwrap()
            .layouts
            .insert(machine_id.to_string(), positions);
    }

    pub fn set_telemetry(&self, telemetry: Telemetry) {
        self.inner
            .lock()
            .unwrap()
            .telemetry
            .insert(telemetry.machine_id.clone(), telemetry);
    }

    /// Make every sale fetch fail until cleared (transient upstream outage).
    pub fn set_fail_fetch(&self, fail: bool) {
        self.inner.lock().unwrap().fail_fetch = fail;
    }

    /// Delay every sale fetch (slow upstream; overlap scenarios).
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().fetch_delay = Some(delay);
    }
}

impl SalesLedger for ScriptedVendor {
    async fn fetch_sales(&self, machine_id: &str, _date: NaiveDate) -> Result<Vec<Sale>> {
        let (delay, fail, window) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.fetch_delay,
                inner.fail_fetch,
                inner.windows.get(machine_id).cloned().unwrap_or_default(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            bail!("scripted fetch failure for {machine_id}");
        }
        Ok(window)
    }

    async fn fetch_layout(&self, machine_id: &str) -> Result<Vec<i32>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .layouts
            .get(machine_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_telemetry(&self, machine_id: &str) -> Result<Telemetry> {
        match self.inner.lock().unwrap().telemetry.get(machine_id) {
            Some(t) => Ok(t.clone()),
            None => bail!("no scripted telemetry for {machine_id}"),
        }
    }
}
