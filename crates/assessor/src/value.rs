//! Value coercion helpers shared by graders.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static MEASUREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("measurement pattern"));

/// The actual number inside a measurement. `"5px"` evaluates as 5.
pub fn unitless(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => MEASUREMENT
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    }
}

/// Strict equality: same JSON type, same value. Never coerces.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => false,
    }
}

/// Human-readable rendering for incorrect-info messages: strings print
/// without quotes, everything else as JSON.
pub fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "nothing".to_string(),
    }
}
