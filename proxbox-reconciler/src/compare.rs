//! Field comparison between hypervisor-derived and registry-recorded values.
//!
//! Registry values arrive loosely typed: numbers may come back as text and
//! unset fields as `null`. An unset or unparseable registry value never
//! matches, so it is always staged for update.

use serde_json::Value;

/// Whether a registry value already holds the desired value.
///
/// Numbers are compared numerically, and text holding a number is compared
/// against a numeric desired value (and vice versa).
pub fn values_match(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (Value::Null, _) => false,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(parsed), Some(n)) => parsed == n,
                _ => false,
            }
        }
        (a, b) => a == b,
    }
}

/// Whether the registry's vCPU text matches the hypervisor count.
pub fn vcpus_match(current: Option<&str>, desired: f64) -> bool {
    current
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|parsed| parsed == desired)
        .unwrap_or(false)
}

/// Whether an integer capacity field matches.
pub fn capacity_matches(current: Option<u64>, desired: u64) -> bool {
    current == Some(desired)
}
