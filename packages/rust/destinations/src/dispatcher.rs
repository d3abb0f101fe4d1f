//! Routes output payloads to named destinations.
//!
//! The dispatcher owns every configured destination, keyed by name. A write
//! never fails loudly: errors are logged and reported as `false`, so one
//! broken destination cannot affect another.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use harvester_shared::{DestinationConfig, HarvesterError, HttpConfig, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::console::ConsoleDestination;
use crate::influxdb::InfluxDbDestination;
use crate::traits::Destination;
use crate::victoriametrics::VictoriaMetricsDestination;

/// Destination types accepted in `[destinations.<name>] type = ...`.
pub const DESTINATION_KINDS: &[&str] = &["console", "victoriametrics", "influxdb"];

/// A named destination plus its `disabled` flag.
#[derive(Clone)]
pub struct Registered {
    pub destination: Arc<dyn Destination>,
    pub disabled: bool,
}

/// Build one destination from its config block.
pub fn build_destination(
    name: &str,
    config: &DestinationConfig,
    client: &Client,
) -> Result<Arc<dyn Destination>> {
    let destination: Arc<dyn Destination> = match config.kind.as_str() {
        "console" => Arc::new(ConsoleDestination::new()),
        "victoriametrics" => Arc::new(VictoriaMetricsDestination::from_options(
            name,
            &config.options,
            client.clone(),
        )?),
        "influxdb" => Arc::new(InfluxDbDestination::from_options(
            name,
            &config.options,
            client.clone(),
        )?),
        other => {
            return Err(HarvesterError::config(format!(
                "destination '{name}' has unknown type '{other}' (expected one of: {})",
                DESTINATION_KINDS.join(", ")
            )));
        }
    };
    Ok(destination)
}

/// Shared HTTP client for destination adapters.
pub fn build_client(http: &HttpConfig) -> Result<Client> {
    Client::builder()
        .user_agent(http.user_agent.as_str())
        .timeout(std::time::Duration::from_secs(http.timeout_secs))
        .build()
        .map_err(|e| HarvesterError::Destination(format!("failed to build HTTP client: {e}")))
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    destinations: BTreeMap<String, Registered>,
}

impl Dispatcher {
    pub fn new(destinations: BTreeMap<String, Registered>) -> Self {
        Self { destinations }
    }

    /// Build every configured destination. Any invalid block fails the whole set.
    pub fn from_config(
        configs: &BTreeMap<String, DestinationConfig>,
        http: &HttpConfig,
    ) -> Result<Self> {
        let client = build_client(http)?;
        let mut destinations = BTreeMap::new();

        for (name, config) in configs {
            let destination = build_destination(name, config, &client)?;
            if config.disabled {
                warn!(destination = %name, "destination is disabled");
            }
            destinations.insert(
                name.clone(),
                Registered {
                    destination,
                    disabled: config.disabled,
                },
            );
        }

        info!(count = destinations.len(), "destinations ready");
        Ok(Self { destinations })
    }

    /// Builder-style registration, mostly for tests and embedding.
    pub fn with_destination(
        mut self,
        name: impl Into<String>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        self.destinations.insert(
            name.into(),
            Registered {
                destination,
                disabled: false,
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.destinations.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.destinations.keys().map(String::as_str)
    }

    /// Write `data` to the destination called `destination` on behalf of `job`.
    ///
    /// Returns whether the write succeeded; failures are logged here.
    pub async fn write(&self, destination: &str, job: &str, data: &Value, options: &Value) -> bool {
        let Some(entry) = self.destinations.get(destination) else {
            error!(job, destination, "unknown destination");
            return false;
        };

        if entry.disabled {
            warn!(job, destination, "skip writing to destination: disabled");
            return true;
        }

        let start = Instant::now();
        let result = entry.destination.write(data, options).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(accepted) => {
                if accepted {
                    info!(job, destination, kind = entry.destination.kind(), duration_ms, "output written");
                } else {
                    warn!(job, destination, duration_ms, "destination rejected the payload");
                }
                accepted
            }
            Err(e) => {
                error!(job, destination, error = %e, duration_ms, "output write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockDestination {
        writes: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Destination for MockDestination {
        fn kind(&self) -> &'static str {
            "mock"
        }

        async fn write(&self, _data: &Value, _options: &Value) -> Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(HarvesterError::Destination("mock failure".into()))
            } else {
                Ok(true)
            }
        }
    }

    fn mock(should_fail: bool) -> (Arc<dyn Destination>, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let destination = Arc::new(MockDestination {
            writes: writes.clone(),
            should_fail,
        });
        (destination, writes)
    }

    #[tokio::test]
    async fn failure_of_one_destination_does_not_block_another() {
        let (d1, d1_writes) = mock(true);
        let (d2, d2_writes) = mock(false);
        let dispatcher = Dispatcher::default()
            .with_destination("d1", d1)
            .with_destination("d2", d2);

        let data = json!({"a": 1});
        assert!(!dispatcher.write("d1", "job", &data, &Value::Null).await);
        assert!(dispatcher.write("d2", "job", &data, &Value::Null).await);
        assert_eq!(d1_writes.load(Ordering::SeqCst), 1);
        assert_eq!(d2_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_destination_is_false() {
        let dispatcher = Dispatcher::default();
        assert!(!dispatcher.write("nope", "job", &json!({}), &Value::Null).await);
    }

    #[tokio::test]
    async fn disabled_destination_is_noop_success() {
        let (d, writes) = mock(true);
        let dispatcher = Dispatcher::new(BTreeMap::from([(
            "off".to_string(),
            Registered {
                destination: d,
                disabled: true,
            },
        )]));
        assert!(dispatcher.write("off", "job", &json!({}), &Value::Null).await);
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn builds_from_config() {
        let configs = BTreeMap::from([
            (
                "console".to_string(),
                DestinationConfig {
                    kind: "console".into(),
                    disabled: false,
                    options: Value::Null,
                },
            ),
            (
                "vm".to_string(),
                DestinationConfig {
                    kind: "victoriametrics".into(),
                    disabled: true,
                    options: json!({"url": "http://localhost:8428"}),
                },
            ),
        ]);
        let dispatcher = Dispatcher::from_config(&configs, &HttpConfig::default()).unwrap();
        assert_eq!(dispatcher.names().collect::<Vec<_>>(), vec!["console", "vm"]);
    }

    #[test]
    fn rejects_unknown_type_and_bad_options() {
        let unknown = BTreeMap::from([(
            "x".to_string(),
            DestinationConfig {
                kind: "kafka".into(),
                disabled: false,
                options: Value::Null,
            },
        )]);
        let err = Dispatcher::from_config(&unknown, &HttpConfig::default()).err().unwrap();
        assert!(err.to_string().contains("unknown type 'kafka'"));

        let missing_url = BTreeMap::from([(
            "vm".to_string(),
            DestinationConfig {
                kind: "victoriametrics".into(),
                disabled: true,
                options: json!({}),
            },
        )]);
        assert!(Dispatcher::from_config(&missing_url, &HttpConfig::default()).is_err());
    }
}
