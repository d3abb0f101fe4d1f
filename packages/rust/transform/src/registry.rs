//! The closed set of named transforms.
//!
//! Each variant owns its typed, already validated options. Lookup by name
//! happens when a step is applied, so a misspelled name fails the run that
//! reaches it rather than config loading.

use harvester_scrape::{TemplateNode, scrape_document};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::TransformError;
use crate::ops::reduce::{ReduceOptions, count, reduce};
use crate::ops::structure::{
    ObjectToArrayOptions, RestructureOptions, object_to_array, restructure,
};
use crate::ops::text::{RegexOptions, ReplaceOptions, regex_compose, regex_replace, replace};
use crate::ops::typecast::{TypecastOptions, text_to_json, typecast};
use crate::ops::{parse_options, required};

/// Every name accepted by [`Transform::from_name`], aliases last.
pub const TRANSFORM_NAMES: &[&str] = &[
    "replace",
    "regexReplace",
    "regexCompose",
    "typecast",
    "textToJson",
    "restructure",
    "count",
    "reduce",
    "objectToArray",
    "scrapeHtml",
    "print",
    "regex_replace",
    "text_to_json",
];

/// A named transform bound to its options.
#[derive(Debug, Clone)]
pub enum Transform {
    Replace(ReplaceOptions),
    RegexReplace(RegexOptions),
    RegexCompose(RegexOptions),
    Typecast(TypecastOptions),
    TextToJson,
    Restructure(RestructureOptions),
    Count,
    Reduce(ReduceOptions),
    ObjectToArray(ObjectToArrayOptions),
    ScrapeHtml(TemplateNode),
    Print { label: Option<String> },
}

#[derive(Deserialize)]
struct RawScrape {
    template: Option<Value>,
}

#[derive(Deserialize)]
struct RawPrint {
    label: Option<String>,
}

impl Transform {
    /// Resolve `name` and validate `options` for it.
    pub fn from_name(name: &str, options: &Value) -> Result<Self, TransformError> {
        Ok(match name {
            "replace" => Self::Replace(ReplaceOptions::from_value(options)?),
            "regexReplace" | "regex_replace" => {
                Self::RegexReplace(RegexOptions::from_value("regexReplace", options, false)?)
            }
            "regexCompose" => {
                Self::RegexCompose(RegexOptions::from_value("regexCompose", options, true)?)
            }
            "typecast" => Self::Typecast(TypecastOptions::from_value(options)?),
            "textToJson" | "text_to_json" => Self::TextToJson,
            "restructure" => Self::Restructure(RestructureOptions::from_value(options)?),
            "count" => Self::Count,
            "reduce" => Self::Reduce(ReduceOptions::from_value(options)?),
            "objectToArray" => Self::ObjectToArray(ObjectToArrayOptions::from_value(options)?),
            "scrapeHtml" => {
                let raw: RawScrape = parse_options("scrapeHtml", options)?;
                let template = required("scrapeHtml", "template", raw.template)?;
                Self::ScrapeHtml(TemplateNode::compile(&template))
            }
            "print" => {
                let raw: RawPrint = parse_options("print", options)?;
                Self::Print { label: raw.label }
            }
            other => return Err(TransformError::Unknown(other.to_string())),
        })
    }

    /// Canonical name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace(_) => "replace",
            Self::RegexReplace(_) => "regexReplace",
            Self::RegexCompose(_) => "regexCompose",
            Self::Typecast(_) => "typecast",
            Self::TextToJson => "textToJson",
            Self::Restructure(_) => "restructure",
            Self::Count => "count",
            Self::Reduce(_) => "reduce",
            Self::ObjectToArray(_) => "objectToArray",
            Self::ScrapeHtml(_) => "scrapeHtml",
            Self::Print { .. } => "print",
        }
    }

    pub fn apply(&self, value: Value) -> Result<Value, TransformError> {
        match self {
            Self::Replace(opts) => replace(opts, value),
            Self::RegexReplace(opts) => regex_replace(opts, value),
            Self::RegexCompose(opts) => regex_compose(opts, value),
            Self::Typecast(opts) => typecast(opts, value),
            Self::TextToJson => text_to_json(value),
            Self::Restructure(opts) => restructure(opts, value),
            Self::Count => count(value),
            Self::Reduce(opts) => reduce(opts, value),
            Self::ObjectToArray(opts) => object_to_array(opts, value),
            Self::ScrapeHtml(template) => match &value {
                Value::String(html) => Ok(scrape_document(html, template)),
                _ => Err(TransformError::mismatch("scrapeHtml", "an HTML string", &value)),
            },
            Self::Print { label } => {
                info!(label = label.as_deref().unwrap_or("print"), value = %value, "print");
                Ok(value)
            }
        }
    }
}

/// Resolve and apply a single transform.
pub fn apply_transformation(
    name: &str,
    options: &Value,
    value: Value,
) -> Result<Value, TransformError> {
    Transform::from_name(name, options)?.apply(value)
}
