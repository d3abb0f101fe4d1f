//! InfluxDB v2 destination writing line protocol.

use std::collections::BTreeMap;

use harvester_shared::{HarvesterError, Result};
use harvester_transform::interpolation;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::traits::{Destination, parse_options, payload_timestamp_ms, post, resolve_single};

const WRITE_PATH: &str = "/api/v2/write";

#[derive(Debug, Deserialize)]
struct InfluxDbOptions {
    url: Option<String>,
    org: Option<String>,
    bucket: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteOptions {
    measurement: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

pub struct InfluxDbDestination {
    name: String,
    endpoint: String,
    org: String,
    bucket: String,
    token: Option<String>,
    client: Client,
}

impl InfluxDbDestination {
    pub fn from_options(name: &str, options: &Value, client: Client) -> Result<Self> {
        let opts: InfluxDbOptions = parse_options(&format!("destination '{name}'"), options)?;
        let require = |value: Option<String>, option: &str| {
            value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                HarvesterError::config(format!(
                    "{option} must be specified for destination '{name}'"
                ))
            })
        };
        let url = require(opts.url, "url")?;

        Ok(Self {
            name: name.to_string(),
            endpoint: format!("{}{WRITE_PATH}", url.trim_end_matches('/')),
            org: require(opts.org, "org")?,
            bucket: require(opts.bucket, "bucket")?,
            token: opts.token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// Render one line-protocol point, or `None` when no field resolved.
    fn line(&self, data: &Value, options: &WriteOptions) -> Result<Option<String>> {
        let measurement = options
            .measurement
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                HarvesterError::Destination(format!("{}: measurement is required", self.name))
            })?;
        if options.fields.is_empty() {
            return Err(HarvesterError::Destination(format!(
                "{}: at least one field is required",
                self.name
            )));
        }

        let mut line = escape(measurement, &[',', ' ']);

        for (key, spec) in &options.tags {
            let Some(value) = self.resolve(data, spec, &format!("tag '{key}'"))? else {
                continue;
            };
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            if text.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(&text, &[',', '=', ' ']));
        }

        let mut fields = Vec::with_capacity(options.fields.len());
        for (key, spec) in &options.fields {
            let Some(value) = self.resolve(data, spec, &format!("field '{key}'"))? else {
                debug!(field = %key, "field matched nothing, skipped");
                continue;
            };
            let rendered = field_value(&value).ok_or_else(|| {
                HarvesterError::Destination(format!(
                    "{}: field '{key}' has unsupported value {value}",
                    self.name
                ))
            })?;
            fields.push(format!("{}={rendered}", escape(key, &[',', '=', ' '])));
        }
        if fields.is_empty() {
            return Ok(None);
        }

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&payload_timestamp_ms(data).to_string());
        Ok(Some(line))
    }

    /// A `${path}` string is resolved against `data`; anything else is a literal.
    fn resolve(&self, data: &Value, spec: &Value, what: &str) -> Result<Option<Value>> {
        match spec {
            Value::String(s) if interpolation(s).is_some() => {
                Ok(resolve_single(data, s, what)?.cloned())
            }
            other => Ok(Some(other.clone())),
        }
    }
}

/// Line protocol field value: floats, booleans and quoted strings.
fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::String(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
        _ => None,
    }
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait::async_trait]
impl Destination for InfluxDbDestination {
    fn kind(&self) -> &'static str {
        "influxdb"
    }

    #[instrument(skip_all, fields(destination = %self.name))]
    async fn write(&self, data: &Value, options: &Value) -> Result<bool> {
        let write_options: WriteOptions =
            parse_options(&format!("{} write", self.name), options)?;
        let Some(line) = self.line(data, &write_options)? else {
            debug!("no field resolved, nothing to write");
            return Ok(true);
        };

        let mut request = self.client.post(&self.endpoint).query(&[
            ("org", self.org.as_str()),
            ("bucket", self.bucket.as_str()),
            ("precision", "ms"),
        ]);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {token}"));
        }
        request = request.header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8");

        debug!(endpoint = %self.endpoint, "writing point");
        post(request, line, &self.endpoint).await?;
        Ok(true)
    }
}
