//! Conversions between JSON values and SQLite values

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlite_conn_mgr::{Row, Value};

/// Convert a JSON argument into the value bound to a statement.
pub(crate) fn to_value(json: JsonValue) -> Value {
   match json {
      JsonValue::Null => Value::Null,
      JsonValue::Bool(flag) => Value::Integer(i64::from(flag)),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            Value::Integer(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Too large for SQLite's INTEGER, so this loses precision
            Value::Real(uint_val as f64)
         } else {
            Value::Real(number.as_f64().unwrap_or_default())
         }
      }
      JsonValue::String(text) => Value::Text(text),
      // Arrays and objects are stored as their JSON text
      other => Value::Text(other.to_string()),
   }
}

/// Convert a result value to JSON. Blobs become base64 strings.
pub(crate) fn to_json(value: Value) -> JsonValue {
   match value {
      Value::Null => JsonValue::Null,
      Value::Integer(integer) => JsonValue::from(integer),
      // NaN and infinities have no JSON form
      Value::Real(real) => serde_json::Number::from_f64(real)
         .map(JsonValue::Number)
         .unwrap_or(JsonValue::Null),
      Value::Text(text) => JsonValue::String(text),
      Value::Blob(blob) => JsonValue::String(STANDARD.encode(blob)),
   }
}

/// Convert a row to a JSON object, keeping the column order of the query.
pub(crate) fn row_to_json(row: Row) -> IndexMap<String, JsonValue> {
   let columns = row.columns().to_vec();
   columns
      .into_iter()
      .zip(row.into_values().into_iter().map(to_json))
      .collect()
}
