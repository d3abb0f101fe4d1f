//! Core domain types for Harvester jobs.
//!
//! These structures are deserialized from the `[jobs.*]` tables of the config
//! file and validated eagerly by [`JobConfig::validate`].

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono_tz::Tz;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvesterError, Result};

/// Payload key holding the run timestamp (Unix epoch, milliseconds).
pub const META_TIMESTAMP_KEY: &str = "__timestamp_ms";

/// Payload key holding the job name.
pub const META_JOB_KEY: &str = "__job_name";

// ---------------------------------------------------------------------------
// ContentKind
// ---------------------------------------------------------------------------

/// Kind of payload a fetch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Json,
    Text,
    Csv,
}

/// Ordered sniffing table: first matching MIME fragment wins.
const CONTENT_TYPE_TABLE: &[(&str, ContentKind)] = &[
    ("text/html", ContentKind::Html),
    ("application/json", ContentKind::Json),
    ("text/plain", ContentKind::Text),
    ("text/csv", ContentKind::Csv),
];

impl ContentKind {
    /// Detect the payload kind from a `Content-Type` header value.
    ///
    /// Case-insensitive substring match against the ordered table.
    pub fn detect(content_type: &str) -> Option<Self> {
        let lowered = content_type.to_ascii_lowercase();
        CONTENT_TYPE_TABLE
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment))
            .map(|(_, kind)| *kind)
    }

    /// Lowercase name as used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Text => "text",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransformStep
// ---------------------------------------------------------------------------

/// One declared step of a transformation chain.
///
/// The name is resolved against the closed transform set at apply time, so an
/// unknown name only fails when the chain actually runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    /// Transform name (`replace`, `regexReplace`, `reduce`, ...).
    pub name: String,
    /// Options bag specific to the transform.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
    /// Addressing expression selecting the sub-value to transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Root key receiving the result (additive placement).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl TransformStep {
    /// Step with no options and whole-value placement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Value::Null,
            source: None,
            destination: None,
        }
    }

    /// Builder-style options setter.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Builder-style source setter.
    pub fn at(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder-style destination setter.
    pub fn into_key(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Requests and inputs
// ---------------------------------------------------------------------------

/// A single HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

impl RequestConfig {
    /// GET request for `url` with no headers or body.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    fn validate(&self, scope: &str) -> Result<()> {
        let parsed = Url::parse(&self.url).map_err(|e| {
            HarvesterError::config(format!("{scope}: invalid url '{}': {e}", self.url))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(HarvesterError::config(format!(
                "{scope}: url '{}' must use http or https",
                self.url
            )));
        }
        self.http_method()
            .map_err(|e| HarvesterError::config(format!("{scope}: {}", strip_config(e))))?;
        Ok(())
    }

    /// The request method, case-insensitive (`post` == `POST`).
    pub fn http_method(&self) -> Result<Method> {
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| HarvesterError::config(format!("invalid HTTP method '{}'", self.method)))
    }
}

/// Parallel fetch of several requests joined into one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub requests: Vec<RequestConfig>,
    /// Chain applied to each fetched result before the join.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
}

/// `[jobs.<name>.input]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeConfig>,
    /// Explicit payload kind; skips content-type sniffing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
}

/// Validated view of where a job's input comes from.
#[derive(Debug, Clone, Copy)]
pub enum InputSource<'a> {
    Single(&'a RequestConfig),
    Merge(&'a MergeConfig),
}

impl InputConfig {
    /// Resolve the single/merge choice. Exactly one must be configured.
    pub fn source(&self) -> Result<InputSource<'_>> {
        match (&self.request, &self.merge) {
            (Some(request), None) => Ok(InputSource::Single(request)),
            (None, Some(merge)) => Ok(InputSource::Merge(merge)),
            (Some(_), Some(_)) => Err(HarvesterError::config(
                "input declares both 'request' and 'merge'",
            )),
            (None, None) => Err(HarvesterError::config(
                "input requires either 'request' or 'merge'",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// `[jobs.<name>.schedule]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5-field (minute precision) or 6/7-field cron expression.
    pub cron: String,
    /// IANA timezone name; UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Run one tick immediately when the scheduler starts.
    #[serde(default)]
    pub run_on_init: bool,
}

impl ScheduleConfig {
    /// Parse the cron expression, normalizing 5-field input to 6 fields.
    pub fn cron_schedule(&self) -> Result<cron::Schedule> {
        let normalized = normalize_cron(&self.cron);
        cron::Schedule::from_str(&normalized).map_err(|e| {
            HarvesterError::config(format!("invalid cron expression '{}': {e}", self.cron))
        })
    }

    /// Resolve the configured timezone (UTC by default).
    pub fn tz(&self) -> Result<Tz> {
        match &self.timezone {
            None => Ok(Tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| HarvesterError::config(format!("unknown timezone '{name}': {e}"))),
        }
    }
}

/// Prepend a seconds field to 5-field cron expressions.
///
/// The `cron` crate requires `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Outputs and jobs
// ---------------------------------------------------------------------------

/// `[[jobs.<name>.outputs]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Name of a registered destination.
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
    /// Destination-specific write options.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

/// `[jobs.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub schedule: ScheduleConfig,
    pub input: InputConfig,
    pub outputs: Vec<OutputConfig>,
    #[serde(default = "default_true")]
    pub autostart: bool,
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Check everything that can be checked before the first tick.
    pub fn validate(&self, name: &str) -> Result<()> {
        let scope = format!("jobs.{name}");
        let prefixed =
            |e: HarvesterError| HarvesterError::config(format!("{scope}: {}", strip_config(e)));

        self.schedule.cron_schedule().map_err(prefixed)?;
        self.schedule.tz().map_err(prefixed)?;

        match self.input.source().map_err(prefixed)? {
            InputSource::Single(request) => request.validate(&format!("{scope}.input.request"))?,
            InputSource::Merge(merge) => {
                if merge.requests.is_empty() {
                    return Err(HarvesterError::config(format!(
                        "{scope}.input.merge: at least one request is required"
                    )));
                }
                for (i, request) in merge.requests.iter().enumerate() {
                    request.validate(&format!("{scope}.input.merge.requests[{i}]"))?;
                }
            }
        }

        if self.outputs.is_empty() {
            return Err(HarvesterError::config(format!(
                "{scope}: at least one output is required"
            )));
        }
        for (i, output) in self.outputs.iter().enumerate() {
            if output.to.trim().is_empty() {
                return Err(HarvesterError::config(format!(
                    "{scope}.outputs[{i}]: 'to' must name a destination"
                )));
            }
        }

        Ok(())
    }
}

fn strip_config(err: HarvesterError) -> String {
    match err {
        HarvesterError::Config { message } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobConfig {
        JobConfig {
            schedule: ScheduleConfig {
                cron: "*/5 * * * *".into(),
                timezone: Some("Europe/Paris".into()),
                run_on_init: false,
            },
            input: InputConfig {
                request: Some(RequestConfig::get("https://api.example.com/data")),
                ..Default::default()
            },
            outputs: vec![OutputConfig {
                to: "console".into(),
                transforms: vec![],
                options: serde_json::Value::Null,
            }],
            autostart: true,
        }
    }

    #[test]
    fn content_kind_detection_is_ordered_and_case_insensitive() {
        assert_eq!(
            ContentKind::detect("Text/HTML; charset=utf-8"),
            Some(ContentKind::Html)
        );
        assert_eq!(
            ContentKind::detect("application/json"),
            Some(ContentKind::Json)
        );
        assert_eq!(ContentKind::detect("text/plain"), Some(ContentKind::Text));
        assert_eq!(ContentKind::detect("text/csv"), Some(ContentKind::Csv));
        assert_eq!(ContentKind::detect("image/png"), None);
    }

    #[test]
    fn valid_job_passes() {
        sample_job().validate("weather").expect("valid job");
    }

    #[test]
    fn five_field_cron_is_normalized() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 0 * * * *"), "0 0 * * * *");
    }

    #[test]
    fn bad_cron_is_config_error() {
        let mut job = sample_job();
        job.schedule.cron = "every minute".into();
        let err = job.validate("weather").unwrap_err();
        assert!(matches!(err, HarvesterError::Config { .. }));
        assert!(err.to_string().contains("jobs.weather"));
    }

    #[test]
    fn unknown_timezone_rejected() {
        let mut job = sample_job();
        job.schedule.timezone = Some("Mars/Olympus".into());
        assert!(job.validate("weather").is_err());
    }

    #[test]
    fn input_requires_exactly_one_source() {
        let mut job = sample_job();
        job.input.request = None;
        assert!(job.validate("weather").is_err());

        let mut job = sample_job();
        job.input.merge = Some(MergeConfig {
            requests: vec![RequestConfig::get("https://a.example.com")],
            transforms: vec![],
        });
        assert!(job.validate("weather").is_err());
    }

    #[test]
    fn empty_merge_rejected() {
        let mut job = sample_job();
        job.input.request = None;
        job.input.merge = Some(MergeConfig {
            requests: vec![],
            transforms: vec![],
        });
        let err = job.validate("weather").unwrap_err();
        assert!(err.to_string().contains("at least one request"));
    }

    #[test]
    fn non_http_url_rejected() {
        let mut job = sample_job();
        job.input.request = Some(RequestConfig::get("file:///etc/passwd"));
        assert!(job.validate("weather").is_err());
    }

    #[test]
    fn http_method_matches_fetch_rules() {
        let mut request = RequestConfig::get("https://api.example.com");
        for ok in ["get", "POST", "PROPFIND", "M-SEARCH", "X_CUSTOM", "V2"] {
            request.method = ok.into();
            assert!(request.http_method().is_ok(), "{ok}");
        }
        assert_eq!(request.http_method().unwrap().as_str(), "V2");

        for bad in ["", "GET POST", "GÉT", "a/b"] {
            request.method = bad.into();
            assert!(request.http_method().is_err(), "{bad:?}");
        }

        let mut job = sample_job();
        job.input.request.as_mut().unwrap().method = "GET POST".into();
        let err = job.validate("weather").unwrap_err();
        assert!(err.to_string().contains("invalid HTTP method 'GET POST'"));
    }

    #[test]
    fn job_without_outputs_rejected() {
        let mut job = sample_job();
        job.outputs.clear();
        assert!(job.validate("weather").is_err());
    }

    #[test]
    fn missing_required_field_fails_deserialization() {
        let toml_str = r#"
outputs = []
[schedule]
cron = "* * * * *"
"#;
        let parsed: std::result::Result<JobConfig, _> = toml::from_str(toml_str);
        assert!(parsed.is_err(), "missing 'input' must fail");
    }

    #[test]
    fn transform_step_from_toml() {
        let toml_str = r#"
name = "replace"
source = "$.title"
options = { search = "a", replaceWith = "b" }
"#;
        let step: TransformStep = toml::from_str(toml_str).expect("parse step");
        assert_eq!(step.name, "replace");
        assert_eq!(step.source.as_deref(), Some("$.title"));
        assert_eq!(step.options["replaceWith"], "b");
        assert!(step.destination.is_none());
    }
}
