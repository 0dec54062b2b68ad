//! Serde bridge between typed values and stored items.
//!
//! Values pass through `serde_json::Value`:
//!
//! | JSON    | attribute |
//! |---------|-----------|
//! | string  | `S`       |
//! | number  | `N`       |
//! | boolean | `BOOL`    |
//! | null    | `NULL`    |
//! | array   | `L`       |
//! | object  | `M`       |
//!
//! On the way back `SS`/`NS`/`BS` decode as arrays and `B` as a base64
//! string.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use dynarepo_model::{AttributeValue, Item};

/// Errors converting between typed values and items.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode item: {0}")]
    Decode(#[source] serde_json::Error),
    /// Only maps can become items.
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("stored number {0} is not representable")]
    InvalidNumber(String),
}

/// Encode a serializable value as an item.
pub fn to_item<T: Serialize>(value: &T) -> Result<Item, CodecError> {
    match serde_json::to_value(value).map_err(CodecError::Encode)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, to_attribute_value(v)))
            .collect()),
        other => Err(CodecError::NotAnObject(json_kind(&other))),
    }
}

/// Decode an item into a typed value.
pub fn from_item<T: DeserializeOwned>(item: Item) -> Result<T, CodecError> {
    let map = item
        .into_iter()
        .map(|(k, v)| Ok((k, to_json(v)?)))
        .collect::<Result<Map<String, Value>, CodecError>>()?;
    serde_json::from_value(Value::Object(map)).map_err(CodecError::Decode)
}

#[must_use]
pub fn to_attribute_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(list) => AttributeValue::L(list.into_iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, to_attribute_value(v)))
                .collect(),
        ),
    }
}

pub fn to_json(value: AttributeValue) -> Result<Value, CodecError> {
    Ok(match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => Value::Number(parse_number(&n)?),
        AttributeValue::B(b) => Value::String(BASE64.encode(b)),
        AttributeValue::Ss(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(
            set.iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::Bs(set) => Value::Array(
            set.iter()
                .map(|b| Value::String(BASE64.encode(b)))
                .collect(),
        ),
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => {
            Value::Array(list.into_iter().map(to_json).collect::<Result<_, _>>()?)
        }
        AttributeValue::M(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, to_json(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

fn parse_number(n: &str) -> Result<Number, CodecError> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| CodecError::InvalidNumber(n.to_owned()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
