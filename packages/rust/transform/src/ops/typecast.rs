//! `typecast` and `textToJson`.

use serde::Deserialize;
use serde_json::Value;

use super::{parse_options, required};
use crate::error::TransformError;
use crate::value::{number_value, to_number, to_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Number,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypecastOptions {
    pub target_type: TargetType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTypecast {
    target_type: Option<TargetType>,
}

impl TypecastOptions {
    pub fn from_value(options: &Value) -> Result<Self, TransformError> {
        let raw: RawTypecast = parse_options("typecast", options)?;
        Ok(Self {
            target_type: required("typecast", "targetType", raw.target_type)?,
        })
    }
}

pub fn typecast(options: &TypecastOptions, value: Value) -> Result<Value, TransformError> {
    match options.target_type {
        TargetType::Number => to_number(&value).map(number_value).ok_or_else(|| {
            TransformError::failed(
                "typecast",
                format!("cannot cast {} to number", to_text(&value)),
            )
        }),
        TargetType::String => Ok(Value::String(to_text(&value))),
    }
}

pub fn text_to_json(value: Value) -> Result<Value, TransformError> {
    let Value::String(text) = value else {
        return Err(TransformError::mismatch("textToJson", "a string", &value));
    };
    serde_json::from_str(&text).map_err(|e| TransformError::failed("textToJson", e.to_string()))
}
