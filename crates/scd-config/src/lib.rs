//! scd-config
//!
//! Layered YAML configuration for the ScoopDesk services.
//!
//! Config files merge in order (base -> site -> machine overrides); the
//! merged document is canonicalized to JSON and hashed so every service
//! can log exactly which configuration it runs under. Secret material
//! must arrive via environment variables, never as config literals —
//! loading aborts when a leaf value looks like a credential.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

// ---------------------------------------------------------------------------
// Loading & hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Merge YAML docs in order: earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Secret-literal guard
// ---------------------------------------------------------------------------

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(val) = v.pointer(&ptr) {
            if let Some(s) = val.as_str() {
                if looks_like_secret(s) {
                    bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
                }
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Typed sync settings
// ---------------------------------------------------------------------------

/// Typed view over the `/sync`, `/vendor` and `/daemon` config sections.
///
/// Every field has a safe default so an empty config is runnable in dev.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Seconds between reconciliation ticks per machine.
    pub poll_interval_secs: u64,
    /// Hard timeout on vendor API calls. A pass must never hold the
    /// per-machine guard indefinitely on a stuck request.
    pub fetch_timeout_secs: u64,
    /// Vendor telemetry API base URL.
    pub vendor_base_url: String,
    /// Env var holding the vendor API key (the key itself never lives in config).
    pub vendor_api_key_env: String,
    /// Daemon bind address override.
    pub bind_addr: Option<String>,
    /// Cabinet temperature alert ceiling, °C.
    pub temp_max_c: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            fetch_timeout_secs: 10,
            vendor_base_url: "https://api.vendcloud.example".to_string(),
            vendor_api_key_env: "SCD_VENDOR_API_KEY".to_string(),
            bind_addr: None,
            temp_max_c: -12.0,
        }
    }
}

impl SyncSettings {
    /// Read settings from a merged config document, falling back to
    /// defaults for absent leaves.
    pub fn from_config(config: &Value) -> Self {
        let d = Self::default();
        Self {
            poll_interval_secs: u64_at(config, "/sync/poll_interval_secs")
                .unwrap_or(d.poll_interval_secs),
            fetch_timeout_secs: u64_at(config, "/sync/fetch_timeout_secs")
                .unwrap_or(d.fetch_timeout_secs),
            vendor_base_url: str_at(config, "/vendor/base_url")
                .unwrap_or(d.vendor_base_url),
            vendor_api_key_env: str_at(config, "/vendor/api_key_env")
                .unwrap_or(d.vendor_api_key_env),
            bind_addr: str_at(config, "/daemon/bind_addr"),
            temp_max_c: f64_at(config, "/alerts/temp_max_c").unwrap_or(d.temp_max_c),
        }
    }
}

fn u64_at(v: &Value, ptr: &str) -> Option<u64> {
    v.pointer(ptr).and_then(Value::as_u64)
}

fn f64_at(v: &Value, ptr: &str) -> Option<f64> {
    v.pointer(ptr).and_then(Value::as_f64)
}

fn str_at(v: &Value, ptr: &str) -> Option<String> {
    v.pointer(ptr).and_then(Value::as_str).map(str::to_string)
}
