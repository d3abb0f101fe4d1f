//! HTML-template scraping engine.
//!
//! This crate provides:
//! - [`template`]: JSON templates compiled into a tagged node tree
//! - [`engine`]: the recursive evaluator turning (template, element) pairs into JSON
//!
//! Extraction never fails as a whole: a selector that matches nothing or does
//! not parse yields `null` for that field only.

pub mod engine;
pub mod template;

pub use engine::{
    element_text, extract, extract_list, normalize_text, scrape_document, scrape_html, zip_ordered,
};
pub use template::{Css, FieldMatcher, ListNode, OrderedField, OrderedList, TemplateNode};
