//! JSONPath-style addressing over `serde_json::Value`.
//!
//! Supported syntax: `$` root, `.name`, `['name']` / `["name"]`, `[n]`
//! (negative counts from the end), `.*` / `[*]`, `..` recursive descent,
//! unions `[0,2]` / `['a','b']` and slices `[start:end:step]`. An expression
//! without a leading `$` is read relative to the root (`a.b` == `$.a.b`).
//!
//! Destinations also accept the `${expression}` interpolation form, see
//! [`interpolation`].

use serde_json::Value;

/// Error raised for a malformed addressing expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("empty addressing expression")]
    Empty,

    #[error("invalid addressing expression '{expr}' at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name(String),
    Index(i64),
    Wildcard,
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Vec<Selector>),
    Descendant(Vec<Selector>),
}

/// One step of a concrete location inside a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// A matched node and where it lives.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub location: Vec<Step>,
    pub value: &'a Value,
}

impl<'a> Match<'a> {
    fn child(&self, step: Step, value: &'a Value) -> Self {
        let mut location = self.location.clone();
        location.push(step);
        Self { location, value }
    }
}

/// A parsed addressing expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let mut parser = Parser {
            expr: trimmed,
            chars: trimmed.chars().collect(),
            pos: 0,
        };
        let segments = parser.parse()?;
        Ok(Self {
            source: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

struct Parser<'e> {
    expr: &'e str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn parse(&mut self) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();

        match self.peek() {
            Some('$') => self.pos += 1,
            Some('.') | Some('[') => {}
            _ => segments.push(Segment::Child(vec![Selector::Name(self.name()?)])),
        }

        while let Some(c) = self.peek() {
            match c {
                '.' if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let selectors = match self.peek() {
                        Some('[') => self.bracket()?,
                        Some('*') => {
                            self.pos += 1;
                            vec![Selector::Wildcard]
                        }
                        _ => vec![Selector::Name(self.name()?)],
                    };
                    segments.push(Segment::Descendant(selectors));
                }
                '.' => {
                    self.pos += 1;
                    if self.peek() == Some('*') {
                        self.pos += 1;
                        segments.push(Segment::Child(vec![Selector::Wildcard]));
                    } else {
                        segments.push(Segment::Child(vec![Selector::Name(self.name()?)]));
                    }
                }
                '[' => segments.push(Segment::Child(self.bracket()?)),
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            }
        }

        Ok(segments)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> PathError {
        PathError::Syntax {
            expr: self.expr.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Dotted member name, up to the next `.` or `[`.
    fn name(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected member name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn bracket(&mut self) -> Result<Vec<Selector>, PathError> {
        // consume '['
        self.pos += 1;
        let mut selectors = Vec::new();

        loop {
            self.skip_ws();
            let selector = match self.peek() {
                Some(q @ ('\'' | '"')) => Selector::Name(self.quoted(q)?),
                Some('*') => {
                    self.pos += 1;
                    Selector::Wildcard
                }
                Some(_) => self.index_or_slice()?,
                None => return Err(self.error("unterminated bracket")),
            };
            selectors.push(selector);

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(selectors);
                }
                Some(other) => {
                    return Err(self.error(format!("expected ',' or ']', found '{other}'")));
                }
                None => return Err(self.error("unterminated bracket")),
            }
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, PathError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('\\') => {
                    let escaped = self
                        .peek_at(1)
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    out.push(escaped);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted name")),
            }
        }
    }

    fn index_or_slice(&mut self) -> Result<Selector, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        let token = token.trim();

        if !token.contains(':') {
            return token
                .parse::<i64>()
                .map(Selector::Index)
                .map_err(|_| self.error(format!("expected index, found '{token}'")));
        }

        let parts: Vec<&str> = token.split(':').map(str::trim).collect();
        if parts.len() > 3 {
            return Err(self.error(format!("invalid slice '{token}'")));
        }
        let bound = |s: &str| -> Result<Option<i64>, PathError> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<i64>()
                    .map(Some)
                    .map_err(|_| self.error(format!("invalid slice bound '{s}'")))
            }
        };
        let step = match parts.get(2) {
            Some(s) => bound(s)?.unwrap_or(1),
            None => 1,
        };
        if step == 0 {
            return Err(self.error("slice step cannot be zero"));
        }
        Ok(Selector::Slice {
            start: bound(parts[0])?,
            end: bound(parts[1])?,
            step,
        })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl JsonPath {
    /// All matches with their concrete locations, in document order.
    pub fn locate<'a>(&self, root: &'a Value) -> Vec<Match<'a>> {
        let mut current = vec![Match {
            location: Vec::new(),
            value: root,
        }];

        for segment in &self.segments {
            let mut next = Vec::new();
            match segment {
                Segment::Child(selectors) => {
                    for m in &current {
                        for selector in selectors {
                            select(selector, m, &mut next);
                        }
                    }
                }
                Segment::Descendant(selectors) => {
                    for m in &current {
                        let mut nodes = Vec::new();
                        descend(m, &mut nodes);
                        for node in &nodes {
                            for selector in selectors {
                                select(selector, node, &mut next);
                            }
                        }
                    }
                }
            }
            current = next;
        }

        current
    }

    /// Matched values only.
    pub fn query<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        self.locate(root).into_iter().map(|m| m.value).collect()
    }
}

fn select<'a>(selector: &Selector, m: &Match<'a>, out: &mut Vec<Match<'a>>) {
    match (selector, m.value) {
        (Selector::Name(name), Value::Object(map)) => {
            if let Some(v) = map.get(name) {
                out.push(m.child(Step::Key(name.clone()), v));
            }
        }
        (Selector::Index(index), Value::Array(items)) => {
            let len = items.len() as i64;
            let idx = if *index < 0 { len + index } else { *index };
            if (0..len).contains(&idx) {
                let idx = idx as usize;
                out.push(m.child(Step::Index(idx), &items[idx]));
            }
        }
        (Selector::Wildcard, Value::Object(map)) => {
            for (key, v) in map {
                out.push(m.child(Step::Key(key.clone()), v));
            }
        }
        (Selector::Wildcard, Value::Array(items)) => {
            for (i, v) in items.iter().enumerate() {
                out.push(m.child(Step::Index(i), v));
            }
        }
        (Selector::Slice { start, end, step }, Value::Array(items)) => {
            for i in slice_indices(items.len(), *start, *end, *step) {
                out.push(m.child(Step::Index(i), &items[i]));
            }
        }
        _ => {}
    }
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let mut out = Vec::new();

    if step > 0 {
        let clamp = |x: i64| if x < 0 { (len + x).max(0) } else { x.min(len) };
        let mut i = start.map(clamp).unwrap_or(0);
        let stop = end.map(clamp).unwrap_or(len);
        while i < stop {
            out.push(i as usize);
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    } else {
        let clamp = |x: i64| if x < 0 { (len + x).max(-1) } else { x.min(len - 1) };
        let mut i = start.map(clamp).unwrap_or(len - 1);
        let stop = end.map(clamp).unwrap_or(-1);
        while i > stop {
            if i >= 0 {
                out.push(i as usize);
            }
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    }

    out
}

/// The node itself followed by every descendant, pre-order.
fn descend<'a>(m: &Match<'a>, out: &mut Vec<Match<'a>>) {
    out.push(m.clone());
    match m.value {
        Value::Object(map) => {
            for (key, v) in map {
                descend(&m.child(Step::Key(key.clone()), v), out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                descend(&m.child(Step::Index(i), v), out);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse `expr` and return every matched value.
pub fn query<'a>(expr: &str, root: &'a Value) -> Result<Vec<&'a Value>, PathError> {
    Ok(JsonPath::parse(expr)?.query(root))
}

/// Replace the value at `location`. Returns `false` if the location no longer exists.
pub fn set_at(root: &mut Value, location: &[Step], value: Value) -> bool {
    let mut target = root;
    for step in location {
        let next = match step {
            Step::Key(key) => match target {
                Value::Object(map) => map.get_mut(key),
                _ => None,
            },
            Step::Index(i) => match target {
                Value::Array(items) => items.get_mut(*i),
                _ => None,
            },
        };
        let Some(next) = next else {
            return false;
        };
        target = next;
    }
    *target = value;
    true
}

/// Extract the expression of a `${expression}` interpolation, if `text` is one.
pub fn interpolation(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("${")?.strip_suffix('}')?;
    (!inner.trim().is_empty()).then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "store": {
                "book": [
                    {"title": "A", "price": 8, "tags": ["x"]},
                    {"title": "B", "price": 12},
                    {"title": "C", "price": 9, "isbn": "0-1"}
                ],
                "bicycle": {"color": "red", "price": 20}
            },
            "odd key": 1
        })
    }

    fn q(expr: &str) -> Vec<Value> {
        let d = doc();
        query(expr, &d)
            .expect("valid path")
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn root_and_members() {
        assert_eq!(q("$"), vec![doc()]);
        assert_eq!(q("$.store.bicycle.color"), vec![json!("red")]);
        assert_eq!(q("$['store']['bicycle'][\"price\"]"), vec![json!(20)]);
        assert_eq!(q("$['odd key']"), vec![json!(1)]);
        assert_eq!(q("store.bicycle.color"), vec![json!("red")]);
    }

    #[test]
    fn indices_and_slices() {
        assert_eq!(q("$.store.book[0].title"), vec![json!("A")]);
        assert_eq!(q("$.store.book[-1].title"), vec![json!("C")]);
        assert!(q("$.store.book[7]").is_empty());
        assert_eq!(
            q("$.store.book[0:2].title"),
            vec![json!("A"), json!("B")]
        );
        assert_eq!(
            q("$.store.book[::-1].title"),
            vec![json!("C"), json!("B"), json!("A")]
        );
        assert_eq!(q("$.store.book[0,2].price"), vec![json!(8), json!(9)]);
    }

    #[test]
    fn extreme_slice_steps_stop_at_bounds() {
        let items = json!([1, 2, 3]);
        assert_eq!(
            query("$[1::9223372036854775807]", &items).unwrap(),
            vec![&json!(2)]
        );
        assert_eq!(
            query("$[1::-9223372036854775808]", &items).unwrap(),
            vec![&json!(2)]
        );
        assert_eq!(
            query("$[-9223372036854775808:9223372036854775807]", &items)
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn wildcards_and_descent() {
        assert_eq!(
            q("$.store.book[*].price"),
            vec![json!(8), json!(12), json!(9)]
        );
        assert_eq!(q("$..isbn"), vec![json!("0-1")]);
        // bicycle < book in key order; descent is pre-order.
        assert_eq!(
            q("$..price"),
            vec![json!(20), json!(8), json!(12), json!(9)]
        );
        assert_eq!(q("$.store.bicycle.*").len(), 2);
    }

    #[test]
    fn missing_paths_match_nothing() {
        assert!(q("$.nope").is_empty());
        assert!(q("$.store.bicycle[0]").is_empty());
        assert!(q("$.store.book.title").is_empty());
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(JsonPath::parse("  "), Err(PathError::Empty));
        assert!(JsonPath::parse("$.a[").is_err());
        assert!(JsonPath::parse("$.a[x]").is_err());
        assert!(JsonPath::parse("$.a[::0]").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$['a").is_err());
    }

    #[test]
    fn locations_round_trip_through_set_at() {
        let mut d = doc();
        let path = JsonPath::parse("$.store.book[1].price").unwrap();
        let location = path.locate(&d)[0].location.clone();
        assert_eq!(
            location,
            vec![
                Step::Key("store".into()),
                Step::Key("book".into()),
                Step::Index(1),
                Step::Key("price".into())
            ]
        );
        assert!(set_at(&mut d, &location, json!(99)));
        assert_eq!(d["store"]["book"][1]["price"], 99);

        assert!(!set_at(&mut d, &[Step::Key("ghost".into())], json!(1)));
        assert!(set_at(&mut d, &[], json!("root")));
        assert_eq!(d, json!("root"));
    }

    #[test]
    fn interpolation_form() {
        assert_eq!(interpolation("${$.a.b}"), Some("$.a.b"));
        assert_eq!(interpolation(" ${$.a} "), Some("$.a"));
        assert_eq!(interpolation("${}"), None);
        assert_eq!(interpolation("$.a"), None);
        assert_eq!(interpolation("plain"), None);
    }
}
