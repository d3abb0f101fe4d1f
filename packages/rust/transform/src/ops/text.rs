//! String transforms: `replace`, `regexReplace`, `regexCompose`.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_options, required};
use crate::error::TransformError;

// ---------------------------------------------------------------------------
// replace
// ---------------------------------------------------------------------------

/// Literal substring replacement, all occurrences.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOptions {
    pub search: String,
    pub replace_with: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReplace {
    search: Option<String>,
    replace_with: Option<String>,
}

impl ReplaceOptions {
    pub fn from_value(options: &Value) -> Result<Self, TransformError> {
        let raw: RawReplace = parse_options("replace", options)?;
        Ok(Self {
            search: required("replace", "search", raw.search.filter(|s| !s.is_empty()))?,
            replace_with: required("replace", "replaceWith", raw.replace_with)?,
        })
    }
}

pub fn replace(options: &ReplaceOptions, value: Value) -> Result<Value, TransformError> {
    let Value::String(text) = value else {
        return Err(TransformError::mismatch("replace", "a string", &value));
    };
    Ok(Value::String(
        text.replace(&options.search, &options.replace_with),
    ))
}

// ---------------------------------------------------------------------------
// regexReplace / regexCompose
// ---------------------------------------------------------------------------

/// Compiled pattern plus an output template using `$1`, `$&`, `$<name>` references.
#[derive(Debug, Clone)]
pub struct RegexOptions {
    pub pattern: Regex,
    /// Output template translated to the `regex` crate's `${n}` syntax.
    pub output: String,
}

#[derive(Deserialize)]
struct RawRegex {
    pattern: Option<String>,
    output: Option<String>,
}

impl RegexOptions {
    /// `multi_line` enables `^`/`$` at line boundaries (used by `regexCompose`).
    pub fn from_value(
        transform: &'static str,
        options: &Value,
        multi_line: bool,
    ) -> Result<Self, TransformError> {
        let raw: RawRegex = parse_options(transform, options)?;
        let pattern = required(transform, "pattern", raw.pattern.filter(|p| !p.is_empty()))?;
        let output = required(transform, "output", raw.output)?;

        let source = if multi_line {
            format!("(?m){pattern}")
        } else {
            pattern.clone()
        };
        let compiled = Regex::new(&source).map_err(|e| TransformError::Regex {
            pattern,
            message: e.to_string(),
        })?;

        Ok(Self {
            pattern: compiled,
            output: translate_replacement(&output),
        })
    }
}

/// Substitute the first match only.
pub fn regex_replace(options: &RegexOptions, value: Value) -> Result<Value, TransformError> {
    let Value::String(text) = value else {
        return Err(TransformError::mismatch("regexReplace", "a string", &value));
    };
    Ok(Value::String(
        options
            .pattern
            .replacen(&text, 1, options.output.as_str())
            .into_owned(),
    ))
}

/// Expand the output template with the first match's capture groups.
///
/// Yields `null` when nothing matches or the pattern has no capture group.
pub fn regex_compose(options: &RegexOptions, value: Value) -> Result<Value, TransformError> {
    let Value::String(text) = value else {
        return Err(TransformError::mismatch("regexCompose", "a string", &value));
    };
    if options.pattern.captures_len() <= 1 {
        return Ok(Value::Null);
    }
    let Some(caps) = options.pattern.captures(&text) else {
        return Ok(Value::Null);
    };
    let mut out = String::new();
    caps.expand(&options.output, &mut out);
    Ok(Value::String(out))
}

/// Translate `$1`, `$&`, `$<name>` and `$$` into the `regex` crate syntax.
///
/// Group references are braced so that `$1N` reads as group 1 followed by `N`.
/// A `$` that starts no reference stays literal.
pub fn translate_replacement(output: &str) -> String {
    let chars: Vec<char> = output.chars().collect();
    let mut out = String::with_capacity(output.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('$') => {
                out.push_str("$$");
                i += 2;
            }
            Some('&') => {
                out.push_str("${0}");
                i += 2;
            }
            Some(c) if c.is_ascii_digit() => {
                let start = i + 1;
                let mut end = start;
                while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                out.push_str(&format!("${{{digits}}}"));
                i = end;
            }
            Some('<') => match chars[i + 2..].iter().position(|c| *c == '>') {
                Some(len) => {
                    let name: String = chars[i + 2..i + 2 + len].iter().collect();
                    out.push_str(&format!("${{{name}}}"));
                    i += len + 3;
                }
                None => {
                    out.push_str("$$");
                    i += 1;
                }
            },
            _ => {
                out.push_str("$$");
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn regex(pattern: &str, output: &str, multi_line: bool) -> RegexOptions {
        RegexOptions::from_value(
            "regexReplace",
            &json!({"pattern": pattern, "output": output}),
            multi_line,
        )
        .expect("valid regex options")
    }

    #[test]
    fn replace_all_occurrences() {
        let opts = ReplaceOptions::from_value(&json!({"search": "ab", "replaceWith": "x"})).unwrap();
        assert_eq!(replace(&opts, json!("ab ab")).unwrap(), json!("x x"));
    }

    #[test]
    fn replace_requires_options() {
        let err = ReplaceOptions::from_value(&json!({"replaceWith": "x"})).unwrap_err();
        assert!(matches!(err, TransformError::MissingOption { option: "search", .. }));

        let err = ReplaceOptions::from_value(&json!({"search": "a"})).unwrap_err();
        assert!(matches!(err, TransformError::MissingOption { option: "replaceWith", .. }));

        // Empty replacement is allowed.
        let opts = ReplaceOptions::from_value(&json!({"search": "-", "replaceWith": ""})).unwrap();
        assert_eq!(replace(&opts, json!("a-b")).unwrap(), json!("ab"));
    }

    #[test]
    fn replace_rejects_objects() {
        let opts = ReplaceOptions::from_value(&json!({"search": "a", "replaceWith": "b"})).unwrap();
        let err = replace(&opts, json!({"a": 1})).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { found: "object", .. }));
    }

    #[test]
    fn regex_replace_first_match_only() {
        let opts = regex(r"(\d+)", "N$1", false);
        assert_eq!(regex_replace(&opts, json!("v7")).unwrap(), json!("vN7"));
        assert_eq!(regex_replace(&opts, json!("1 2")).unwrap(), json!("N1 2"));
        assert_eq!(regex_replace(&opts, json!("none")).unwrap(), json!("none"));
    }

    #[test]
    fn regex_compose_extracts() {
        let opts = regex(r"(\d+)\.(\d+)", "$2-$1", true);
        assert_eq!(
            regex_compose(&opts, json!("version 3.14 build")).unwrap(),
            json!("14-3")
        );
        assert_eq!(regex_compose(&opts, json!("no digits")).unwrap(), Value::Null);

        let no_groups = regex(r"\d+", "x", true);
        assert_eq!(regex_compose(&no_groups, json!("42")).unwrap(), Value::Null);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = RegexOptions::from_value(
            "regexReplace",
            &json!({"pattern": "(", "output": "x"}),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Regex { .. }));
    }

    #[test]
    fn replacement_translation() {
        assert_eq!(translate_replacement("N$1"), "N${1}");
        assert_eq!(translate_replacement("$1N"), "${1}N");
        assert_eq!(translate_replacement("[$&]"), "[${0}]");
        assert_eq!(translate_replacement("$<year>"), "${year}");
        assert_eq!(translate_replacement("$$5"), "$$5");
        assert_eq!(translate_replacement("cost $"), "cost $$");
    }
}
