//! Output comparison between what a submission printed and what a test case
//! expects.

use serde_json::Value;

/// Compare the raw stdout of a run against the expected value.
///
/// Both sides are first compared structurally as JSON. If the output is not
/// valid JSON, the trimmed output is compared with the textual form of the
/// expected value instead.
pub fn compare_output(actual: &str, expected: &Value) -> bool {
    match serde_json::from_str::<Value>(actual.trim()) {
        Ok(parsed) => compare_values(&parsed, expected),
        Err(_) => actual.trim() == expected_text(expected).trim(),
    }
}

/// Structural equality after unwrapping strings that hold JSON text, so
/// `"[1,2]"`, `"\"[1,2]\""` and `[1,2]` are all equal.
pub fn compare_values(actual: &Value, expected: &Value) -> bool {
    values_equal(&normalize(actual), &normalize(expected))
}

/// Unwrap JSON held in strings until the value is no longer such a string.
fn normalize(v: &Value) -> Value {
    let mut v = v.clone();
    while let Value::String(s) = &v {
        match serde_json::from_str::<Value>(s) {
            Ok(parsed) => v = parsed,
            Err(_) => break,
        }
    }
    v
}

fn expected_text(expected: &Value) -> String {
    match expected {
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // `2` and `2.0` are the same answer.
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => a == b,
    }
}
