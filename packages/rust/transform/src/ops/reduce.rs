//! `count` and `reduce`.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{parse_options, required};
use crate::error::TransformError;
use crate::value::{number_value, to_number, to_text, truthy};

/// Length of a string (in characters) or an array.
pub fn count(value: Value) -> Result<Value, TransformError> {
    match &value {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        _ => Err(TransformError::mismatch(
            "count",
            "a string or an array",
            &value,
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOperation {
    Sum,
    Average,
    Count,
    Any,
    All,
    Max,
    Min,
}

impl ReduceOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Count => "count",
            Self::Any => "any",
            Self::All => "all",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    /// Result over an empty array.
    fn empty(self) -> Value {
        match self {
            Self::Sum | Self::Average | Self::Count => Value::from(0),
            Self::Any => Value::Bool(false),
            Self::All => Value::Bool(true),
            Self::Max | Self::Min => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOptions {
    pub operation: ReduceOperation,
    /// Field read from each object element instead of the element itself.
    pub key: Option<String>,
}

#[derive(Deserialize)]
struct RawReduce {
    operation: Option<ReduceOperation>,
    key: Option<String>,
}

impl ReduceOptions {
    pub fn from_value(options: &Value) -> Result<Self, TransformError> {
        let raw: RawReduce = parse_options("reduce", options)?;
        Ok(Self {
            operation: required("reduce", "operation", raw.operation)?,
            key: raw.key.filter(|k| !k.is_empty()),
        })
    }
}

pub fn reduce(options: &ReduceOptions, value: Value) -> Result<Value, TransformError> {
    let op = options.operation;

    if let (Value::String(s), ReduceOperation::Count) = (&value, op) {
        if options.key.is_some() {
            warn!(transform = "reduce", "key ignored for string input");
        }
        return Ok(Value::from(s.chars().count()));
    }

    let Value::Array(items) = &value else {
        return Err(TransformError::mismatch("reduce", "an array", &value));
    };
    if items.is_empty() {
        return Ok(op.empty());
    }

    let selected = select(items, options.key.as_deref());

    let result = match op {
        ReduceOperation::Count => Value::from(selected.len()),
        ReduceOperation::Any => Value::Bool(selected.iter().any(|v| v.is_some_and(truthy))),
        ReduceOperation::All => Value::Bool(selected.iter().all(|v| v.is_some_and(truthy))),
        ReduceOperation::Sum => number_value(numbers(op, &selected)?.iter().sum()),
        ReduceOperation::Average => {
            let nums = numbers(op, &selected)?;
            number_value(nums.iter().sum::<f64>() / nums.len() as f64)
        }
        ReduceOperation::Max => number_value(
            numbers(op, &selected)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max),
        ),
        ReduceOperation::Min => number_value(
            numbers(op, &selected)?
                .into_iter()
                .fold(f64::INFINITY, f64::min),
        ),
    };

    Ok(result)
}

/// Pick the reduced item per element. `None` marks an object lacking `key`.
fn select<'a>(items: &'a [Value], key: Option<&str>) -> Vec<Option<&'a Value>> {
    let Some(key) = key else {
        return items.iter().map(Some).collect();
    };
    let mut warned = false;
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.get(key),
            other => {
                if !warned {
                    warn!(transform = "reduce", key, "key ignored for non-object element");
                    warned = true;
                }
                Some(other)
            }
        })
        .collect()
}

fn numbers(op: ReduceOperation, selected: &[Option<&Value>]) -> Result<Vec<f64>, TransformError> {
    selected
        .iter()
        .map(|item| {
            item.and_then(to_number).ok_or_else(|| {
                let shown = item.map(to_text).unwrap_or_else(|| "undefined".into());
                TransformError::failed(
                    "reduce",
                    format!("cannot convert '{shown}' to number for {}", op.as_str()),
                )
            })
        })
        .collect()
}
