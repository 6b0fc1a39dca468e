use serde_json::Value;

/// Returns `true` for values that can hold children (arrays and objects).
pub fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Explicit structural clone of a JSON value.
///
/// Invoked at event-construction time so that an emitted payload is an
/// independent copy: no later mutation of the live tree can alter an
/// already-delivered event.
pub fn deep_clone(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(deep_clone).collect()),
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| (key.clone(), deep_clone(child)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        scalar => scalar.clone(),
    }
}

/// Recursive structural equality between two JSON values.
///
/// Object comparison is key-based and ignores key order; values of
/// different types are never equal (`0 != null`, `1 != true`).
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, x)| right.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}
