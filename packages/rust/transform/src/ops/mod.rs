//! Transform implementations, grouped by the kind of value they work on.

pub mod reduce;
pub mod structure;
pub mod text;
pub mod typecast;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::TransformError;

/// Deserialize an options bag; a missing (`null`) bag reads as `{}`.
pub(crate) fn parse_options<T: DeserializeOwned>(
    transform: &'static str,
    options: &Value,
) -> Result<T, TransformError> {
    let bag = if options.is_null() {
        Value::Object(Map::new())
    } else {
        options.clone()
    };
    serde_json::from_value(bag).map_err(|e| TransformError::Options {
        transform,
        message: e.to_string(),
    })
}

/// Unwrap a required option.
pub(crate) fn required<T>(
    transform: &'static str,
    option: &'static str,
    value: Option<T>,
) -> Result<T, TransformError> {
    value.ok_or(TransformError::MissingOption { transform, option })
}
