//! scd-vendor
//!
//! Client for the vending-machine vendor telemetry API.
//!
//! This crate owns the wire boundary: envelope decoding, the
//! quantity-as-text and price-as-decimal-string normalization quirks,
//! and the HTTP transport with its bounded timeout. Everything past
//! this boundary works with the normalized `scd-schemas` types.

mod client;
mod raw;

pub use client::HttpVendorClient;
pub use raw::{
    normalize_sale, parse_price_cents, parse_qty, RawEnvelope, RawLayoutSlot, RawSale,
    RawTelemetry, RawTopping, VendorError,
};
