//! Application configuration for Harvester.
//!
//! The config lives at `~/.harvester/harvester.toml` unless a path is given
//! on the command line (or via `HARVESTER_CONFIG`). It is loaded once at
//! process start; jobs and destinations are built from it eagerly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};
use crate::types::JobConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvester.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".harvester";

// ---------------------------------------------------------------------------
// Config structs (matching harvester.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP client and dispatch settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Named destinations (`[destinations.<name>]`).
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,

    /// Named jobs (`[jobs.<name>]`).
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound for one output's destination write, in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("Harvester/", env!("CARGO_PKG_VERSION")).into()
}
fn default_dispatch_timeout_secs() -> u64 {
    60
}

/// `[destinations.<name>]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Adapter type: `console`, `victoriametrics`, `influxdb`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Disabled destinations accept writes as a no-op.
    #[serde(default)]
    pub disabled: bool,

    /// Adapter-specific options.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl AppConfig {
    /// Validate every job table. Destinations are validated when built.
    pub fn validate_jobs(&self) -> Result<()> {
        for (name, job) in &self.jobs {
            job.validate(name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.harvester/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvesterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.harvester/harvester.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from the default location.
/// Returns defaults (no jobs) if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvesterError::io(path, e))?;
    parse_config(&content)
        .map_err(|e| HarvesterError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Parse config text (TOML).
pub fn parse_config(content: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvesterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let mut config = AppConfig::default();
    config.destinations.insert(
        "console".into(),
        DestinationConfig {
            kind: "console".into(),
            disabled: false,
            options: serde_json::Value::Null,
        },
    );
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvesterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvesterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, InputSource};

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("timeout_secs"));
        assert!(toml_str.contains("Harvester/"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.http.timeout_secs, 30);
        assert_eq!(parsed.http.dispatch_timeout_secs, 60);
    }

    #[test]
    fn config_with_jobs_and_destinations() {
        let toml_str = r#"
[destinations.vm]
type = "victoriametrics"
options = { url = "http://localhost:8428" }

[destinations.out]
type = "console"
disabled = true

[jobs.weather.schedule]
cron = "*/5 * * * *"
run_on_init = true

[jobs.weather.input]
content_type = "json"
request = { url = "https://api.example.com/weather", headers = { Accept = "application/json" } }

[[jobs.weather.input.transforms]]
name = "restructure"
options = { template = { temp = "$.current.temp" } }

[[jobs.weather.outputs]]
to = "vm"
options = { metrics = [ { name = "temp", value = "${$.temp}" } ] }
"#;
        let config = parse_config(toml_str).expect("parse");
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.destinations["vm"].kind, "victoriametrics");
        assert!(config.destinations["out"].disabled);

        let job = &config.jobs["weather"];
        assert!(job.autostart, "autostart defaults to true");
        assert!(job.schedule.run_on_init);
        assert_eq!(job.input.content_type, Some(ContentKind::Json));
        assert_eq!(job.input.transforms.len(), 1);
        assert_eq!(job.outputs[0].options["metrics"][0]["name"], "temp");

        match job.input.source().expect("source") {
            InputSource::Single(request) => {
                assert_eq!(request.method, "GET");
                assert_eq!(request.headers["Accept"], "application/json");
            }
            InputSource::Merge(_) => panic!("expected single request"),
        }

        config.validate_jobs().expect("jobs validate");
    }

    #[test]
    fn example_fixture_loads() {
        let path = Path::new("../../../fixtures/config/harvester.toml");
        let config = load_config_from(path).expect("load fixture config");
        assert!(config.jobs.contains_key("headlines"));
        assert!(config.destinations.contains_key("console"));
        config.validate_jobs().expect("fixture jobs validate");
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let err = load_config_from(Path::new("/nonexistent/harvester.toml")).unwrap_err();
        assert!(matches!(err, HarvesterError::Io { .. }));
    }
}
