//! Raw vendor payloads and their normalization.
//!
//! The vendor API wraps every response in a `{code, msg, data}` envelope
//! and is loose with numeric types: topping quantities arrive as JSON
//! numbers, numeric strings, or not at all; prices are decimal strings.
//! Normalization to the strict `scd-schemas` types happens here and
//! nowhere else.

use std::fmt;

use chrono::NaiveDateTime;
use scd_schemas::{Sale, ToppingConsumption};
use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors the vendor boundary may return.
#[derive(Debug)]
pub enum VendorError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error envelope.
    Api { code: i64, message: String },
    /// A response payload could not be decoded or normalized.
    Decode(String),
    /// A required configuration value (base URL, API key) is missing or invalid.
    Config(String),
}

impl fmt::Display for VendorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorError::Transport(msg) => write!(f, "transport error: {msg}"),
            VendorError::Api { code, message } => {
                write!(f, "vendor api error code={code}: {message}")
            }
            VendorError::Decode(msg) => write!(f, "decode error: {msg}"),
            VendorError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for VendorError {}

// ---------------------------------------------------------------------------
// Envelope & raw records
// ---------------------------------------------------------------------------

/// `{code, msg, data}` wrapper around every vendor response.
/// `code == 0` is success; anything else carries `msg`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> RawEnvelope<T> {
    /// Unwrap the envelope into its payload or an API/decode error.
    pub fn into_data(self) -> Result<T, VendorError> {
        if self.code != 0 {
            return Err(VendorError::Api {
                code: self.code,
                message: self.msg.unwrap_or_else(|| "unspecified".to_string()),
            });
        }
        self.data
            .ok_or_else(|| VendorError::Decode("envelope code=0 but data missing".to_string()))
    }
}

/// One topping entry as sent by the vendor. `qty` is deliberately left
/// as a raw JSON value: observed payloads carry numbers, numeric
/// strings, and sometimes nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTopping {
    pub position: i32,
    #[serde(default)]
    pub qty: Value,
}

/// One sale record as sent by the vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSale {
    pub order_id: String,
    /// `YYYY-MM-DD HH:MM:SS`, vendor clock, UTC.
    pub created_at: String,
    pub goods_name: String,
    /// Decimal string, e.g. `"3.50"`.
    pub price: String,
    #[serde(default)]
    pub toppings: Vec<RawTopping>,
}

/// One dispenser slot in the machine's layout listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLayoutSlot {
    pub position: i32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Cabinet telemetry payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTelemetry {
    /// Decimal string, e.g. `"-15.2"`.
    pub temperature: String,
    pub sale_count: i64,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Parse a topping quantity from whatever the vendor sent.
/// Absent, non-numeric, or negative values all normalize to 1 — one
/// vend consumes at least one unit, and guessing higher over-deducts.
pub fn parse_qty(raw: &Value) -> i64 {
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(q) if q >= 0 => q,
        _ => 1,
    }
}

/// Parse a decimal price string into integer cents. Fractions beyond
/// two digits are truncated; a malformed price is a decode error.
pub fn parse_price_cents(raw: &str) -> Result<i64, VendorError> {
    let s = raw.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    let whole: i64 = whole
        .parse()
        .map_err(|_| VendorError::Decode(format!("bad price: {raw:?}")))?;
    if whole < 0 {
        return Err(VendorError::Decode(format!("negative price: {raw:?}")));
    }
    let frac2 = format!("{:0<2}", frac.chars().take(2).collect::<String>());
    let cents: i64 = frac2
        .parse()
        .map_err(|_| VendorError::Decode(format!("bad price: {raw:?}")))?;
    Ok(whole * 100 + cents)
}

/// Convert a raw sale into the normalized domain record.
///
/// Entries keep their wire order and are not aggregated here; summing
/// same-position entries is the reconcile engine's job.
pub fn normalize_sale(raw: RawSale) -> Result<Sale, VendorError> {
    let ts = NaiveDateTime::parse_from_str(&raw.created_at, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| VendorError::Decode(format!("bad timestamp: {:?}", raw.created_at)))?
        .and_utc();

    let toppings = raw
        .toppings
        .iter()
        .map(|t| ToppingConsumption {
            position: t.position,
            qty: parse_qty(&t.qty),
        })
        .collect();

    Ok(Sale {
        sale_id: raw.order_id,
        ts_utc: ts,
        product: raw.goods_name,
        price_cents: parse_price_cents(&raw.price)?,
        toppings,
    })
}
