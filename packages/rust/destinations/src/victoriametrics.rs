//! VictoriaMetrics destination using the JSON line import API.
//!
//! Every configured metric becomes one line
//! `{"metric": {"__name__": ..., labels...}, "values": [v], "timestamps": [ms]}`
//! posted to `<url>/api/v1/import`.

use std::collections::BTreeMap;

use harvester_shared::{HarvesterError, Result};
use harvester_transform::value::to_number;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::traits::{Destination, parse_options, payload_timestamp_ms, post, resolve_single};

const IMPORT_PATH: &str = "/api/v1/import";

#[derive(Debug, Deserialize)]
struct VictoriaMetricsOptions {
    url: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Per-output write options.
#[derive(Debug, Deserialize)]
struct WriteOptions {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    metrics: Vec<MetricSpec>,
}

#[derive(Debug, Deserialize)]
struct MetricSpec {
    name: Option<String>,
    /// `${<path>}` expression resolving to the sample value.
    value: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

pub struct VictoriaMetricsDestination {
    name: String,
    endpoint: String,
    labels: BTreeMap<String, String>,
    client: Client,
}

impl VictoriaMetricsDestination {
    pub fn from_options(name: &str, options: &Value, client: Client) -> Result<Self> {
        let opts: VictoriaMetricsOptions =
            parse_options(&format!("destination '{name}'"), options)?;
        let url = opts.url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            HarvesterError::config(format!("url must be specified for destination '{name}'"))
        })?;

        Ok(Self {
            name: name.to_string(),
            endpoint: format!("{}{IMPORT_PATH}", url.trim_end_matches('/')),
            labels: opts.labels,
            client,
        })
    }

    /// Build the import lines for `data`. Metrics whose value matches nothing are skipped.
    fn lines(&self, data: &Value, options: &WriteOptions) -> Result<Vec<Value>> {
        if options.metrics.is_empty() {
            return Err(HarvesterError::Destination(format!(
                "{}: no metric specified in options",
                self.name
            )));
        }

        let timestamp = payload_timestamp_ms(data);
        let mut lines = Vec::with_capacity(options.metrics.len());

        for metric in &options.metrics {
            let name = metric.name.as_deref().filter(|n| !n.is_empty()).ok_or_else(|| {
                HarvesterError::Destination(format!("{}: metric name undefined", self.name))
            })?;
            let expression = metric.value.as_deref().ok_or_else(|| {
                HarvesterError::Destination(format!(
                    "{}: 'value' must be defined for metric '{name}'",
                    self.name
                ))
            })?;

            let what = format!("metric '{name}'");
            let Some(raw) = resolve_single(data, expression, &what)? else {
                debug!(metric = name, expression, "metric value matched nothing, skipped");
                continue;
            };
            let value = to_number(raw).ok_or_else(|| {
                HarvesterError::Destination(format!("invalid value {raw} for metric '{name}'"))
            })?;

            let mut labels = self.labels.clone();
            labels.extend(options.labels.clone());
            labels.extend(metric.labels.clone());
            let mut metric_labels = serde_json::Map::new();
            metric_labels.insert("__name__".into(), Value::String(name.to_string()));
            for (k, v) in labels {
                metric_labels.entry(k).or_insert(Value::String(v));
            }

            lines.push(json!({
                "metric": metric_labels,
                "values": [value],
                "timestamps": [timestamp],
            }));
        }

        Ok(lines)
    }
}

#[async_trait::async_trait]
impl Destination for VictoriaMetricsDestination {
    fn kind(&self) -> &'static str {
        "victoriametrics"
    }

    #[instrument(skip_all, fields(destination = %self.name))]
    async fn write(&self, data: &Value, options: &Value) -> Result<bool> {
        let write_options: WriteOptions =
            parse_options(&format!("{} write", self.name), options)?;
        let lines = self.lines(data, &write_options)?;

        if lines.is_empty() {
            debug!("no metric resolved, nothing to import");
            return Ok(true);
        }

        let body = lines
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(lines = lines.len(), endpoint = %self.endpoint, "importing metrics");

        post(self.client.post(&self.endpoint), body, &self.endpoint).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn destination(url: &str) -> VictoriaMetricsDestination {
        VictoriaMetricsDestination::from_options(
            "vm",
            &json!({"url": url, "labels": {"source": "harvester"}}),
            Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn url_is_required() {
        let err = VictoriaMetricsDestination::from_options("vm", &json!({}), Client::new())
            .err()
            .unwrap();
        assert!(matches!(err, HarvesterError::Config { .. }));
    }

    #[test]
    fn builds_lines_with_merged_labels() {
        let vm = destination("http://localhost:8428/");
        assert_eq!(vm.endpoint, "http://localhost:8428/api/v1/import");

        let data = json!({"temp": "21.5", "__timestamp_ms": 1700000000000i64});
        let opts: WriteOptions = serde_json::from_value(json!({
            "labels": {"city": "oslo"},
            "metrics": [
                {"name": "temperature", "value": "${$.temp}", "labels": {"unit": "c"}},
                {"name": "humidity", "value": "${$.humidity}"}
            ]
        }))
        .unwrap();

        let lines = vm.lines(&data, &opts).unwrap();
        assert_eq!(
            lines,
            vec![json!({
                "metric": {"__name__": "temperature", "source": "harvester", "city": "oslo", "unit": "c"},
                "values": [21.5],
                "timestamps": [1700000000000i64],
            })]
        );
    }

    #[test]
    fn metric_values_use_loose_number_coercion() {
        let vm = destination("http://localhost:8428");
        let data = json!({"n": null, "e": "", "h": "0x1F", "b": true, "__timestamp_ms": 1});
        let opts: WriteOptions = serde_json::from_value(json!({
            "metrics": [
                {"name": "n", "value": "${$.n}"},
                {"name": "e", "value": "${$.e}"},
                {"name": "h", "value": "${$.h}"},
                {"name": "b", "value": "${$.b}"}
            ]
        }))
        .unwrap();

        let values: Vec<Value> = vm
            .lines(&data, &opts)
            .unwrap()
            .into_iter()
            .map(|line| line["values"][0].clone())
            .collect();
        assert_eq!(values, vec![json!(0.0), json!(0.0), json!(31.0), json!(1.0)]);
    }

    #[test]
    fn rejects_bad_metric_specs() {
        let vm = destination("http://localhost:8428");
        let data = json!({"a": [1, 2], "s": "n/a"});

        let no_metrics: WriteOptions = serde_json::from_value(json!({})).unwrap();
        assert!(vm.lines(&data, &no_metrics).is_err());

        for metric in [
            json!({"name": "m", "value": "${$.a[*]}"}),
            json!({"name": "m", "value": "$.a[0]"}),
            json!({"name": "m", "value": "${$.s}"}),
            json!({"value": "${$.a[0]}"}),
        ] {
            let opts: WriteOptions =
                serde_json::from_value(json!({ "metrics": [metric] })).unwrap();
            assert!(vm.lines(&data, &opts).is_err());
        }
    }

    #[tokio::test]
    async fn posts_json_lines_to_import_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/import"))
            .and(body_string(
                r#"{"metric":{"__name__":"up","source":"harvester"},"timestamps":[5],"values":[1.0]}"#,
            ))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let vm = destination(&server.uri());
        let ok = vm
            .write(
                &json!({"up": 1, "__timestamp_ms": 5}),
                &json!({"metrics": [{"name": "up", "value": "${$.up}"}]}),
            )
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let vm = destination(&server.uri());
        let err = vm
            .write(
                &json!({"up": 1}),
                &json!({"metrics": [{"name": "up", "value": "${$.up}"}]}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarvesterError::Destination(_)));
    }
}
