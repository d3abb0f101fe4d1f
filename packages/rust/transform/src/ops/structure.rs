//! Shape-changing transforms: `restructure` and `objectToArray`.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_options, required};
use crate::error::TransformError;
use crate::path::JsonPath;

// ---------------------------------------------------------------------------
// restructure
// ---------------------------------------------------------------------------

/// Compiled restructure template.
#[derive(Debug, Clone)]
pub enum Shape {
    Query(JsonPath),
    Object(Vec<(String, Shape)>),
    Array(Vec<Shape>),
    Literal(Value),
}

impl Shape {
    fn compile(template: &Value) -> Result<Self, TransformError> {
        Ok(match template {
            Value::String(expr) => Shape::Query(JsonPath::parse(expr)?),
            Value::Object(map) => Shape::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Shape::compile(v)?)))
                    .collect::<Result<_, TransformError>>()?,
            ),
            Value::Array(items) => Shape::Array(
                items
                    .iter()
                    .map(Shape::compile)
                    .collect::<Result<_, TransformError>>()?,
            ),
            other => Shape::Literal(other.clone()),
        })
    }

    fn build(&self, root: &Value) -> Value {
        match self {
            Shape::Query(path) => {
                let mut found = path.query(root);
                if found.len() == 1 {
                    found.remove(0).clone()
                } else {
                    Value::Array(found.into_iter().cloned().collect())
                }
            }
            Shape::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, shape)| (k.clone(), shape.build(root)))
                    .collect::<Map<_, _>>(),
            ),
            Shape::Array(items) => Value::Array(items.iter().map(|s| s.build(root)).collect()),
            Shape::Literal(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestructureOptions {
    pub template: Shape,
}

#[derive(Deserialize)]
struct RawRestructure {
    template: Option<Map<String, Value>>,
}

impl RestructureOptions {
    pub fn from_value(options: &Value) -> Result<Self, TransformError> {
        let raw: RawRestructure = parse_options("restructure", options)?;
        let template = required("restructure", "template", raw.template)?;
        Ok(Self {
            template: Shape::compile(&Value::Object(template))?,
        })
    }
}

pub fn restructure(options: &RestructureOptions, value: Value) -> Result<Value, TransformError> {
    if !(value.is_object() || value.is_array()) {
        return Err(TransformError::mismatch(
            "restructure",
            "an object or array",
            &value,
        ));
    }
    Ok(options.template.build(&value))
}

// ---------------------------------------------------------------------------
// objectToArray
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectToArrayOptions {
    pub key_field: String,
    pub value_field: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObjectToArray {
    key_field: Option<String>,
    value_field: Option<String>,
}

impl ObjectToArrayOptions {
    pub fn from_value(options: &Value) -> Result<Self, TransformError> {
        let raw: RawObjectToArray = parse_options("objectToArray", options)?;
        Ok(Self {
            key_field: raw
                .key_field
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "key".into()),
            value_field: raw
                .value_field
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "value".into()),
        })
    }
}

pub fn object_to_array(
    options: &ObjectToArrayOptions,
    value: Value,
) -> Result<Value, TransformError> {
    let Value::Object(map) = value else {
        return Err(TransformError::mismatch("objectToArray", "an object", &value));
    };
    Ok(Value::Array(
        map.into_iter()
            .map(|(k, v)| {
                let mut record = Map::new();
                record.insert(options.key_field.clone(), Value::String(k));
                record.insert(options.value_field.clone(), v);
                Value::Object(record)
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn restructured(template: Value, value: Value) -> Value {
        let opts = RestructureOptions::from_value(&json!({ "template": template })).unwrap();
        restructure(&opts, value).unwrap()
    }

    #[test]
    fn restructure_single_and_missing_matches() {
        assert_eq!(restructured(json!({"x": "$.a"}), json!({"a": 5})), json!({"x": 5}));
        assert_eq!(restructured(json!({"x": "$.b"}), json!({"a": 5})), json!({"x": []}));
    }

    #[test]
    fn restructure_multiple_matches_and_nesting() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}], "meta": {"page": 3}});
        let out = restructured(
            json!({
                "ids": "$.items[*].id",
                "paging": {"page": "$.meta.page", "source": 7},
                "pair": ["$.meta.page", "$.items[0].id"]
            }),
            doc,
        );
        assert_eq!(
            out,
            json!({
                "ids": [1, 2],
                "paging": {"page": 3, "source": 7},
                "pair": [3, 1]
            })
        );
    }

    #[test]
    fn restructure_rejects_bad_input() {
        let err = RestructureOptions::from_value(&json!({})).unwrap_err();
        assert!(matches!(err, TransformError::MissingOption { option: "template", .. }));

        let err = RestructureOptions::from_value(&json!({"template": {"x": "$["}})).unwrap_err();
        assert!(matches!(err, TransformError::Path(_)));

        let opts = RestructureOptions::from_value(&json!({"template": {"x": "$.a"}})).unwrap();
        assert!(restructure(&opts, json!("text")).is_err());
    }

    #[test]
    fn object_to_array_records() {
        let opts = ObjectToArrayOptions::from_value(&Value::Null).unwrap();
        assert_eq!(
            object_to_array(&opts, json!({"a": 1, "b": "x"})).unwrap(),
            json!([{"key": "a", "value": 1}, {"key": "b", "value": "x"}])
        );

        let opts =
            ObjectToArrayOptions::from_value(&json!({"keyField": "k", "valueField": "v"})).unwrap();
        assert_eq!(
            object_to_array(&opts, json!({"a": 1})).unwrap(),
            json!([{"k": "a", "v": 1}])
        );

        assert!(object_to_array(&opts, json!([1])).is_err());
    }
}
