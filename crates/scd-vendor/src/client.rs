//! HTTP client for the vendor telemetry API.

use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use scd_config::SyncSettings;
use scd_schemas::{Sale, Telemetry};
use scd_sync::SalesLedger;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::raw::{
    normalize_sale, RawEnvelope, RawLayoutSlot, RawSale, RawTelemetry, VendorError,
};

/// Vendor API client with a hard per-request timeout. A stuck upstream
/// request must never hold a machine's in-flight guard indefinitely.
#[derive(Clone)]
pub struct HttpVendorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVendorClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VendorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VendorError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from loaded settings; the API key comes from the
    /// environment variable the settings name, never from config itself.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self, VendorError> {
        let api_key = std::env::var(&settings.vendor_api_key_env).map_err(|_| {
            VendorError::Config(format!("missing env var {}", settings.vendor_api_key_env))
        })?;
        Self::new(
            settings.vendor_base_url.clone(),
            api_key,
            Duration::from_secs(settings.fetch_timeout_secs),
        )
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VendorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "vendor api request");

        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| VendorError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VendorError::Api {
                code: i64::from(status.as_u16()),
                message: format!("http status {status}"),
            });
        }

        let envelope: RawEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| VendorError::Decode(e.to_string()))?;
        envelope.into_data()
    }
}

impl SalesLedger for HttpVendorClient {
    async fn fetch_sales(&self, machine_id: &str, date: NaiveDate) -> Result<Vec<Sale>> {
        let raw: Vec<RawSale> = self
            .get_data(
                &format!("/api/v1/machines/{machine_id}/orders"),
                &[("date", date.format("%Y-%m-%d").to_string())],
            )
            .await?;

        let mut sales = Vec::with_capacity(raw.len());
        for r in raw {
            sales.push(normalize_sale(r)?);
        }
        Ok(sales)
    }

    async fn fetch_layout(&self, machine_id: &str) -> Result<Vec<i32>> {
        let slots: Vec<RawLayoutSlot> = self
            .get_data(&format!("/api/v1/machines/{machine_id}/layout"), &[])
            .await?;
        Ok(slots.into_iter().map(|s| s.position).collect())
    }

    async fn fetch_telemetry(&self, machine_id: &str) -> Result<Telemetry> {
        let raw: RawTelemetry = self
            .get_data(&format!("/api/v1/machines/{machine_id}/telemetry"), &[])
            .await?;

        let temp: f64 = raw
            .temperature
            .trim()
            .parse()
            .map_err(|_| VendorError::Decode(format!("bad temperature: {:?}", raw.temperature)))?;

        Ok(Telemetry {
            machine_id: machine_id.to_string(),
            cabinet_temp_c: temp,
            sale_count_today: raw.sale_count,
            captured_at_utc: Utc::now(),
        })
    }
}
