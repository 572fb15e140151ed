//! Protocol value encoding.
//!
//! Inline values cross the realm boundary in a wrapped form:
//!
//! | JavaScript Type | Protocol Format |
//! |-----------------|-----------------|
//! | String | `{"s": "value"}` |
//! | Number | `{"n": 123}` |
//! | Boolean | `{"b": true}` |
//! | null | `{"v": "null"}` |
//! | undefined | `{"v": "undefined"}` |
//! | Array | `{"a": [...]}` |
//! | Object | `{"o": [{"k": "key", "v": {...}}...]}` |
//! | Date | `{"d": "ISO string"}` |
//! | BigInt | `{"bi": "string"}` |
//! | Handle | `{"h": id}` (not serializable) |

use serde_json::{Map, Value};
use thiserror::Error;

/// A wrapped value that has no plain JSON form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
	/// The value embeds a reference to a remote object.
	#[error("cannot serialize handle reference to JSON")]
	HandleReference,
}

/// Wraps plain JSON in the protocol encoding.
pub fn to_protocol_value(value: &Value) -> Value {
	match value {
		Value::Null => serde_json::json!({ "v": "null" }),
		Value::Bool(b) => serde_json::json!({ "b": b }),
		Value::Number(n) => serde_json::json!({ "n": n }),
		Value::String(s) => serde_json::json!({ "s": s }),
		Value::Array(items) => {
			let items: Vec<Value> = items.iter().map(to_protocol_value).collect();
			serde_json::json!({ "a": items })
		}
		Value::Object(map) => {
			let entries: Vec<Value> = map
				.iter()
				.map(|(k, v)| serde_json::json!({ "k": k, "v": to_protocol_value(v) }))
				.collect();
			serde_json::json!({ "o": entries })
		}
	}
}

/// Unwraps the protocol encoding into plain JSON.
///
/// `undefined`, `NaN` and the infinities map to `null`; `-0` maps to `0`.
///
/// # Errors
///
/// Returns [`ValueError::HandleReference`] if the value contains a handle.
pub fn from_protocol_value(value: &Value) -> Result<Value, ValueError> {
	let Value::Object(map) = value else {
		return Ok(value.clone());
	};

	if let Some(s) = map.get("s") {
		return Ok(s.clone());
	}
	if let Some(n) = map.get("n") {
		return Ok(n.clone());
	}
	if let Some(b) = map.get("b") {
		return Ok(b.clone());
	}
	if let Some(v) = map.get("v").and_then(|v| v.as_str()) {
		return Ok(match v {
			"-0" => serde_json::json!(0),
			_ => Value::Null,
		});
	}
	if let Some(arr) = map.get("a").and_then(|v| v.as_array()) {
		let converted: Result<Vec<Value>, ValueError> = arr.iter().map(from_protocol_value).collect();
		return Ok(Value::Array(converted?));
	}
	if let Some(entries) = map.get("o").and_then(|v| v.as_array()) {
		let mut result = Map::new();
		for entry in entries {
			if let (Some(key), Some(val)) = (entry.get("k").and_then(|k| k.as_str()), entry.get("v")) {
				result.insert(key.to_string(), from_protocol_value(val)?);
			}
		}
		return Ok(Value::Object(result));
	}
	if let Some(date) = map.get("d").and_then(|v| v.as_str()) {
		return Ok(Value::String(date.to_string()));
	}
	if let Some(bigint) = map.get("bi").and_then(|v| v.as_str()) {
		return Ok(Value::String(bigint.to_string()));
	}
	if map.contains_key("h") {
		return Err(ValueError::HandleReference);
	}
	Ok(value.clone())
}
