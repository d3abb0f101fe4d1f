//! Scrape templates compiled into a tagged node tree.
//!
//! A template is plain JSON (usually read from the config file):
//!
//! - `"h1.title"`: CSS selector, text of the first match
//! - `{ "title": "h1", "price": ".price" }`: fields evaluated on the same element
//! - `{ "cssSelector": "a.next", "attribute": "href" }`: attribute of the first match
//! - `{ "cssSelector": "article", "template": { ... } }`: recurse into the first match
//! - `[ T ]`: every match of `T` (see [`ListNode`])
//!
//! Compilation never fails. Invalid selectors and malformed leaves compile to
//! nodes that evaluate to `null` (or an empty list), and are logged once here.

use scraper::Selector;
use serde_json::{Map, Value};
use tracing::warn;

/// Keys recognized as the selector of an object template.
const SELECTOR_KEYS: [&str; 2] = ["cssSelector", "selector"];

// ---------------------------------------------------------------------------
// Css
// ---------------------------------------------------------------------------

/// A CSS selector with its source text. `selector` is `None` if it failed to parse.
#[derive(Debug, Clone)]
pub struct Css {
    pub source: String,
    pub selector: Option<Selector>,
}

impl Css {
    pub fn parse(source: &str) -> Self {
        let selector = match Selector::parse(source) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = source, error = %e, "invalid CSS selector in scrape template");
                None
            }
        };
        Self {
            source: source.to_string(),
            selector,
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A compiled template node evaluated against a single element.
#[derive(Debug, Clone)]
pub enum TemplateNode {
    /// Normalized text of the first match.
    Selector(Css),
    /// Each field evaluated against the same element.
    Fields(Vec<(String, TemplateNode)>),
    /// Attribute value of the first match.
    Attribute { selector: Css, attribute: String },
    /// Recurse with `template` into the first match.
    Nested { selector: Css, template: Box<TemplateNode> },
    /// Evaluated against all matches.
    List(Box<ListNode>),
    /// Malformed leaf; evaluates to `null`.
    Invalid,
}

/// The item template `T` of an array template `[T]`.
#[derive(Debug, Clone)]
pub enum ListNode {
    /// Normalized text of every match.
    Text(Css),
    /// Attribute value of every match.
    Attribute { selector: Css, attribute: String },
    /// Greedy zip of consecutive matches into records.
    Ordered(OrderedList),
    /// Per-match recursive extraction.
    Nested { selector: Css, template: TemplateNode },
    /// Implicit row grouping: every field is a list, rows zip to the shortest.
    Rows(Vec<(String, ListNode)>),
    /// Malformed item; evaluates to an empty list.
    Invalid,
}

/// `{ "cssSelector": ..., "ordered": [ {key, tag} | {key, template}, ... ] }`
#[derive(Debug, Clone)]
pub struct OrderedList {
    pub selector: Css,
    pub fields: Vec<OrderedField>,
    /// Discard a trailing record that did not fill every descriptor.
    pub drop_partial: bool,
}

/// One descriptor of an ordered list.
#[derive(Debug, Clone)]
pub struct OrderedField {
    pub key: String,
    pub matcher: FieldMatcher,
}

/// How an ordered descriptor accepts an element.
#[derive(Debug, Clone)]
pub enum FieldMatcher {
    /// Element tag name matches (case-insensitive); value is its text.
    Tag(String),
    /// Sub-template yields a non-empty value.
    Template(TemplateNode),
    /// Descriptor with neither `tag` nor `template`; never matches.
    Invalid,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

impl TemplateNode {
    /// Compile a JSON template.
    pub fn compile(template: &Value) -> Self {
        match template {
            Value::String(sel) => Self::Selector(Css::parse(sel)),
            Value::Object(obj) => match selector_of(obj) {
                Some(sel) => {
                    let selector = Css::parse(sel);
                    if let Some(attribute) = obj.get("attribute").and_then(Value::as_str) {
                        Self::Attribute {
                            selector,
                            attribute: attribute.to_string(),
                        }
                    } else {
                        let template = obj
                            .get("template")
                            .map(Self::compile)
                            .unwrap_or(Self::Invalid);
                        Self::Nested {
                            selector,
                            template: Box::new(template),
                        }
                    }
                }
                None => Self::Fields(
                    obj.iter()
                        .map(|(key, val)| (key.clone(), Self::compile(val)))
                        .collect(),
                ),
            },
            Value::Array(items) => Self::List(Box::new(ListNode::compile(items.first()))),
            other => {
                warn!(leaf = %other, "malformed scrape template leaf");
                Self::Invalid
            }
        }
    }
}

impl ListNode {
    /// Compile the first item of an array template.
    pub fn compile(item: Option<&Value>) -> Self {
        match item {
            Some(Value::String(sel)) => Self::Text(Css::parse(sel)),
            Some(Value::Object(obj)) => match selector_of(obj) {
                Some(sel) => {
                    let selector = Css::parse(sel);
                    if let Some(attribute) = obj.get("attribute").and_then(Value::as_str) {
                        Self::Attribute {
                            selector,
                            attribute: attribute.to_string(),
                        }
                    } else if let Some(ordered) = obj.get("ordered") {
                        Self::Ordered(OrderedList {
                            selector,
                            fields: compile_ordered(ordered),
                            drop_partial: obj
                                .get("dropPartial")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        })
                    } else {
                        let template = obj
                            .get("template")
                            .map(TemplateNode::compile)
                            .unwrap_or(TemplateNode::Invalid);
                        Self::Nested { selector, template }
                    }
                }
                None => Self::Rows(
                    obj.iter()
                        .map(|(key, val)| (key.clone(), Self::compile(Some(val))))
                        .collect(),
                ),
            },
            Some(other) => {
                warn!(item = %other, "malformed array template item");
                Self::Invalid
            }
            None => Self::Invalid,
        }
    }
}

fn selector_of(obj: &Map<String, Value>) -> Option<&str> {
    SELECTOR_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
}

fn compile_ordered(ordered: &Value) -> Vec<OrderedField> {
    let Some(descriptors) = ordered.as_array() else {
        warn!("'ordered' must be a list of field descriptors");
        return Vec::new();
    };

    descriptors
        .iter()
        .filter_map(|d| {
            let key = d.get("key").and_then(Value::as_str)?;
            let matcher = if let Some(template) = d.get("template") {
                FieldMatcher::Template(TemplateNode::compile(template))
            } else if let Some(tag) = d.get("tag").and_then(Value::as_str) {
                FieldMatcher::Tag(tag.to_string())
            } else {
                warn!(key, "ordered descriptor needs 'tag' or 'template'");
                FieldMatcher::Invalid
            };
            Some(OrderedField {
                key: key.to_string(),
                matcher,
            })
        })
        .collect()
}
