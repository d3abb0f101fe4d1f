//! Destination trait and helpers shared by the adapters.

use chrono::Utc;
use harvester_shared::{HarvesterError, META_TIMESTAMP_KEY, Result};
use harvester_transform::{JsonPath, interpolation};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A sink receiving the payloads of job outputs.
///
/// `data` is the job payload after the output's own transform chain;
/// `options` is the per-output options bag from the job config.
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    /// Adapter type (`console`, `victoriametrics`, `influxdb`).
    fn kind(&self) -> &'static str;

    /// Deliver one payload. `Ok(true)` means it was accepted.
    async fn write(&self, data: &Value, options: &Value) -> Result<bool>;
}

/// Deserialize an adapter or write options bag; `null` reads as `{}`.
pub(crate) fn parse_options<T: DeserializeOwned>(context: &str, options: &Value) -> Result<T> {
    let bag = if options.is_null() {
        Value::Object(Map::new())
    } else {
        options.clone()
    };
    serde_json::from_value(bag)
        .map_err(|e| HarvesterError::config(format!("invalid options for {context}: {e}")))
}

/// Resolve a `${path}` expression against `data`.
///
/// Returns `Ok(None)` when nothing matches and an error for more than one
/// match or a value that is not an expression.
pub(crate) fn resolve_single<'a>(
    data: &'a Value,
    expression: &str,
    what: &str,
) -> Result<Option<&'a Value>> {
    let inner = interpolation(expression).ok_or_else(|| {
        HarvesterError::Destination(format!(
            "invalid value for {what}: expected '${{<path>}}', got '{expression}'"
        ))
    })?;
    let path = JsonPath::parse(inner)
        .map_err(|e| HarvesterError::Destination(format!("{what}: {e}")))?;

    let mut found = path.query(data);
    match found.len() {
        0 => Ok(None),
        1 => Ok(Some(found.remove(0))),
        n => Err(HarvesterError::Destination(format!(
            "value '{expression}' for {what} matches {n} entries"
        ))),
    }
}

/// Sample timestamp: the payload's run timestamp, else the current time.
pub(crate) fn payload_timestamp_ms(data: &Value) -> i64 {
    data.get(META_TIMESTAMP_KEY)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}

/// POST `body` and turn a non-2xx answer into a destination error.
pub(crate) async fn post(
    request: reqwest::RequestBuilder,
    body: String,
    endpoint: &str,
) -> Result<()> {
    let response = request
        .body(body)
        .send()
        .await
        .map_err(|e| HarvesterError::Destination(format!("{endpoint}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(HarvesterError::Destination(format!(
            "{endpoint}: HTTP {status}: {text}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_single_match() {
        let data = json!({"temp": {"value": 21.5}, "list": [1, 2]});
        assert_eq!(
            resolve_single(&data, "${$.temp.value}", "metric").unwrap(),
            Some(&json!(21.5))
        );
        assert_eq!(resolve_single(&data, "${$.nope}", "metric").unwrap(), None);
        assert!(resolve_single(&data, "${$.list[*]}", "metric").is_err());
        assert!(resolve_single(&data, "$.temp.value", "metric").is_err());
    }

    #[test]
    fn timestamp_falls_back_to_now() {
        assert_eq!(payload_timestamp_ms(&json!({"__timestamp_ms": 1700000000000i64})), 1700000000000);
        assert!(payload_timestamp_ms(&json!({})) > 1_600_000_000_000);
    }
}
