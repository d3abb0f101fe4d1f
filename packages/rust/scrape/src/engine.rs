//! Recursive evaluator for compiled scrape templates.

use scraper::{ElementRef, Html};
use serde_json::{Map, Value};
use tracing::debug;

use crate::template::{Css, FieldMatcher, ListNode, OrderedField, OrderedList, TemplateNode};

/// Scrape an HTML document with a JSON template.
pub fn scrape_html(html: &str, template: &Value) -> Value {
    scrape_document(html, &TemplateNode::compile(template))
}

/// Scrape an HTML document with an already compiled template.
pub fn scrape_document(html: &str, node: &TemplateNode) -> Value {
    let doc = Html::parse_document(html);
    debug!(bytes = html.len(), "scraping document");
    extract(node, doc.root_element())
}

/// Evaluate a node against `element`.
pub fn extract(node: &TemplateNode, element: ElementRef<'_>) -> Value {
    match node {
        TemplateNode::Selector(css) => first(css, element)
            .map(|el| Value::String(element_text(el)))
            .unwrap_or(Value::Null),
        TemplateNode::Fields(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, sub)| (key.clone(), extract(sub, element)))
                .collect(),
        ),
        TemplateNode::Attribute {
            selector,
            attribute,
        } => first(selector, element)
            .and_then(|el| el.value().attr(attribute))
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        TemplateNode::Nested { selector, template } => first(selector, element)
            .map(|el| extract(template, el))
            .unwrap_or(Value::Null),
        TemplateNode::List(item) => Value::Array(extract_list(item, element)),
        TemplateNode::Invalid => Value::Null,
    }
}

/// Evaluate an array item template against all matches under `element`.
pub fn extract_list(node: &ListNode, element: ElementRef<'_>) -> Vec<Value> {
    match node {
        ListNode::Text(css) => all(css, element)
            .into_iter()
            .map(|el| Value::String(element_text(el)))
            .collect(),
        ListNode::Attribute {
            selector,
            attribute,
        } => all(selector, element)
            .into_iter()
            .map(|el| {
                el.value()
                    .attr(attribute)
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null)
            })
            .collect(),
        ListNode::Ordered(list) => {
            let elements = all(&list.selector, element);
            zip_ordered(&elements, list)
        }
        ListNode::Nested { selector, template } => all(selector, element)
            .into_iter()
            .map(|el| extract(template, el))
            .collect(),
        ListNode::Rows(fields) => group_rows(fields, element),
        ListNode::Invalid => Vec::new(),
    }
}

/// Greedily zip consecutive elements into records.
///
/// Each record is one pass over the descriptors: the current element is
/// offered to each descriptor in turn and consumed by the first that accepts
/// it; descriptors that reject it stay empty for this record. An element that
/// no descriptor accepts is skipped.
pub fn zip_ordered(elements: &[ElementRef<'_>], list: &OrderedList) -> Vec<Value> {
    let mut records = Vec::new();
    let mut i = 0;

    while i < elements.len() {
        let mut record = Map::new();

        for field in &list.fields {
            let Some(el) = elements.get(i) else {
                break;
            };
            if let Some(value) = accept(field, *el) {
                record.insert(field.key.clone(), value);
                i += 1;
            }
        }

        if record.is_empty() {
            debug!(index = i, "element matched no ordered descriptor, skipping");
            i += 1;
            continue;
        }

        let complete = record.len() == list.fields.len();
        let exhausted = i >= elements.len();
        if !complete && exhausted && list.drop_partial {
            debug!(fields = record.len(), "dropping trailing partial record");
            break;
        }

        records.push(Value::Object(record));
    }

    records
}

fn accept(field: &OrderedField, element: ElementRef<'_>) -> Option<Value> {
    let value = match &field.matcher {
        FieldMatcher::Tag(tag) if element.value().name().eq_ignore_ascii_case(tag) => {
            Value::String(element_text(element))
        }
        FieldMatcher::Tag(_) | FieldMatcher::Invalid => return None,
        FieldMatcher::Template(template) => extract(template, element),
    };
    (!is_empty_value(&value)).then_some(value)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Evaluate every field as a list and zip the lists into rows.
///
/// The row count is the length of the shortest field list.
fn group_rows(fields: &[(String, ListNode)], element: ElementRef<'_>) -> Vec<Value> {
    let columns: Vec<(&str, Vec<Value>)> = fields
        .iter()
        .map(|(key, node)| (key.as_str(), extract_list(node, element)))
        .collect();

    let rows = columns.iter().map(|(_, col)| col.len()).min().unwrap_or(0);

    (0..rows)
        .map(|i| {
            Value::Object(
                columns
                    .iter()
                    .map(|(key, col)| (key.to_string(), col[i].clone()))
                    .collect(),
            )
        })
        .collect()
}

fn first<'a>(css: &Css, element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let selector = css.selector.as_ref()?;
    element.select(selector).next()
}

fn all<'a>(css: &Css, element: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    match &css.selector {
        Some(selector) => element.select(selector).collect(),
        None => Vec::new(),
    }
}

/// Text content of an element, normalized.
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// Trim and collapse every whitespace run (tabs, newlines, NBSP) to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
