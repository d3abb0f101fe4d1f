//! HTTP fetching and payload decoding for job inputs.

use std::time::Duration;

use harvester_shared::{ContentKind, HarvesterError, HttpConfig, RequestConfig, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

/// Raw response of one input request.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Shared client for input requests.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| HarvesterError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Perform one request. Any non-2xx status is an error.
    #[instrument(skip_all, fields(url = %request.url, method = %request.method))]
    pub async fn fetch(&self, request: &RequestConfig) -> Result<Fetched> {
        let method = request.http_method()?;

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HarvesterError::Fetch(format!("{}: {e}", request.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvesterError::Fetch(format!(
                "{}: HTTP {status}",
                request.url
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| HarvesterError::Fetch(format!("{}: failed to read body: {e}", request.url)))?;

        debug!(
            bytes = body.len(),
            content_type = content_type.as_deref().unwrap_or("-"),
            "fetched"
        );

        Ok(Fetched {
            url: request.url.clone(),
            content_type,
            body,
        })
    }
}

/// Payload kind: the configured one, else sniffed from the response header.
pub fn resolve_kind(configured: Option<ContentKind>, fetched: &Fetched) -> Result<ContentKind> {
    if let Some(kind) = configured {
        return Ok(kind);
    }
    let header = fetched.content_type.as_deref().unwrap_or("");
    ContentKind::detect(header).ok_or_else(|| HarvesterError::ContentType {
        content_type: header.to_string(),
    })
}

/// Turn a response body into a JSON value according to its kind.
pub fn decode(kind: ContentKind, body: String) -> Result<Value> {
    match kind {
        ContentKind::Json => serde_json::from_str(&body)
            .map_err(|e| HarvesterError::parse(format!("invalid JSON body: {e}"))),
        ContentKind::Html | ContentKind::Text | ContentKind::Csv => Ok(Value::String(body)),
    }
}
