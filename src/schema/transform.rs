//! Record normalisation against a stream schema

use super::types::{JsonType, SchemaProperty};
use super::JsonSchema;
use crate::error::{Error, Result};
use crate::types::{datetime_from_millis, format_iso8601, parse_datetime};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Shapes a raw record to match its schema before it is emitted
pub trait RecordTransformer: Send + Sync {
    fn transform(&self, record: Value, schema: &JsonSchema) -> Result<Value>;
}

/// Converts date-time values to RFC 3339 and numeric strings to numbers.
///
/// Properties absent from the schema pass through untouched. Values that do
/// not fit their declared type are kept as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaTransformer;

impl RecordTransformer for SchemaTransformer {
    fn transform(&self, record: Value, schema: &JsonSchema) -> Result<Value> {
        match record {
            Value::Object(map) => Ok(Value::Object(transform_object(map, &schema.properties)?)),
            other => Err(Error::schema(format!(
                "Expected a JSON object record, got: {other}"
            ))),
        }
    }
}

fn transform_object(
    mut map: Map<String, Value>,
    properties: &BTreeMap<String, SchemaProperty>,
) -> Result<Map<String, Value>> {
    for (name, value) in map.iter_mut() {
        if let Some(property) = properties.get(name) {
            let taken = std::mem::take(value);
            *value = transform_value(taken, property)?;
        }
    }
    Ok(map)
}

fn transform_value(value: Value, property: &SchemaProperty) -> Result<Value> {
    if property.is_date_time() {
        return date_time(value);
    }

    match (value, property.json_type.primary_type()) {
        (Value::String(s), Some(JsonType::Integer)) => Ok(s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(s))),
        (Value::String(s), Some(JsonType::Number)) => Ok(s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::String(s), Value::Number)),
        (Value::Object(map), Some(JsonType::Object)) => match &property.properties {
            Some(nested) => Ok(Value::Object(transform_object(map, nested)?)),
            None => Ok(Value::Object(map)),
        },
        (Value::Array(items), Some(JsonType::Array)) => match &property.items {
            Some(item_schema) => items
                .into_iter()
                .map(|item| transform_value(item, item_schema))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            None => Ok(Value::Array(items)),
        },
        (value, _) => Ok(value),
    }
}

/// Epoch milliseconds and parseable strings become RFC 3339 UTC
fn date_time(value: Value) -> Result<Value> {
    match value {
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => match n.as_f64() {
                    Some(f) if f.is_finite() => f.trunc() as i64,
                    _ => return Ok(Value::Number(n)),
                },
            };
            Ok(Value::String(format_iso8601(datetime_from_millis(millis)?)))
        }
        Value::String(s) => match parse_datetime(&s) {
            Ok(dt) => Ok(Value::String(format_iso8601(dt))),
            Err(_) => Ok(Value::String(s)),
        },
        other => Ok(other),
    }
}
