//! Configuration module.
//!
//! The configuration file is JSON, named by the `MONITOR_CONFIG` environment
//! variable. Monitoring features live under the top-level `monitor` key, one
//! section per feature; a section that is missing or malformed disables only
//! the feature that needed it.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::probe::ProbeKind;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MONITOR_CONFIG";

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no environment variable {0}")]
    MissingEnv(&'static str),
    #[error("cannot open configuration file '{path}': {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("'{0}' key not found")]
    MissingSection(&'static str),
    #[error("no servers")]
    NoServers,
}

/// One monitored server entry under `ping_servers`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    #[serde(rename = "type")]
    pub kind: ProbeKind,
}

/// The `monitor.servers` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersConfig {
    pub ping_interval_sec: u64,
    pub previous_data_points: usize,
    pub ping_servers: BTreeMap<String, TargetEntry>,
}

/// The `monitor.temperature` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureConfig {
    pub outside_hot_alert_threshold: f64,
    pub pipe_alert_threshold: f64,
    pub forecast_interval_hours: u64,
}

/// Parsed configuration file, queried per section.
#[derive(Debug)]
pub struct Config {
    root: serde_json::Value,
}

impl Config {
    /// Load the configuration file named by `MONITOR_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV).map_err(|_| ConfigError::MissingEnv(CONFIG_ENV))?;
        Self::from_path(Path::new(&path))
    }

    /// Load a configuration file from an explicit path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let root = serde_json::from_str(&raw)?;
        Ok(Self { root })
    }

    fn section(&self, key: &'static str) -> Result<&serde_json::Value, ConfigError> {
        let monitor = self
            .root
            .get("monitor")
            .ok_or(ConfigError::MissingSection("monitor"))?;
        monitor.get(key).ok_or(ConfigError::MissingSection(key))
    }

    /// Extract the server monitoring section.
    pub fn servers(&self) -> Result<ServersConfig, ConfigError> {
        let cfg: ServersConfig = serde_json::from_value(self.section("servers")?.clone())?;
        if cfg.ping_servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(cfg)
    }

    /// Extract the outside temperature section.
    pub fn temperature(&self) -> Result<TemperatureConfig, ConfigError> {
        Ok(serde_json::from_value(self.section("temperature")?.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NORMAL_CONFIG: &str = r#"
        {
            "book": {
                "hello": "world"
            },
            "monitor": {
                "temperature": {
                    "outside_hot_alert_threshold": 30.0,
                    "pipe_alert_threshold": 1.0,
                    "forecast_interval_hours": 4
                },
                "servers": {
                    "ping_interval_sec": 60,
                    "previous_data_points": 10,
                    "ping_servers": {
                        "https://www.example.com/": { "type": "Web" },
                        "example.com": { "type": "DNS" },
                        "www.example.com": { "type": "ICMP" }
                    }
                }
            }
        }
    "#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_servers_section() {
        let file = write_config(NORMAL_CONFIG);
        let config = Config::from_path(file.path()).unwrap();
        let servers = config.servers().unwrap();
        assert_eq!(servers.ping_interval_sec, 60);
        assert_eq!(servers.previous_data_points, 10);
        assert_eq!(servers.ping_servers.len(), 3);
        assert_eq!(
            servers.ping_servers["https://www.example.com/"].kind,
            ProbeKind::Http
        );
        assert_eq!(servers.ping_servers["example.com"].kind, ProbeKind::Dns);
        assert_eq!(servers.ping_servers["www.example.com"].kind, ProbeKind::Icmp);
    }

    #[test]
    fn test_temperature_section() {
        let file = write_config(NORMAL_CONFIG);
        let config = Config::from_path(file.path()).unwrap();
        let temperature = config.temperature().unwrap();
        assert_eq!(temperature.outside_hot_alert_threshold, 30.0);
        assert_eq!(temperature.pipe_alert_threshold, 1.0);
        assert_eq!(temperature.forecast_interval_hours, 4);
    }

    #[test]
    fn test_missing_monitor_key() {
        let file = write_config(r#"{ "book": { "hello": "world" } }"#);
        let config = Config::from_path(file.path()).unwrap();
        let err = config.servers().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("monitor")));
    }

    #[test]
    fn test_missing_section_key() {
        let file = write_config(r#"{ "monitor": {} }"#);
        let config = Config::from_path(file.path()).unwrap();
        let err = config.servers().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("servers")));
    }

    #[test]
    fn test_no_servers() {
        let file = write_config(
            r#"
            {
                "monitor": {
                    "servers": {
                        "ping_interval_sec": 60,
                        "previous_data_points": 10,
                        "ping_servers": {}
                    }
                }
            }
            "#,
        );
        let config = Config::from_path(file.path()).unwrap();
        assert!(matches!(config.servers(), Err(ConfigError::NoServers)));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_config(r#"{ "monitor": , }"#);
        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_unreadable_file() {
        let err = Config::from_path(Path::new("/nonexistent/monitor.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
