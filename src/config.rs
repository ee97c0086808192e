//! Configuration file management for certfetch.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments. It supports a hierarchical configuration system where
//! settings can be specified in multiple places with clear precedence rules.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (certfetch.toml or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! hosts = ["example.com", "example.com:8443"]
//! port = 443
//! connect_timeout_ms = 1000
//! handshake_timeout_ms = 5000
//! insecure_skip_verify = true
//! output = "table"
//! exit_code = 1
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::output::OutputFormat;
use crate::{FetchOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PORT};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "certfetch.toml";

/// Main configuration structure for certfetch.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// List of hosts to inspect
    pub hosts: Option<Vec<String>>,
    /// Port used for hosts that do not carry one
    pub port: Option<u16>,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// TLS handshake timeout in milliseconds
    pub handshake_timeout_ms: Option<u64>,
    /// Accept any peer certificate
    pub insecure_skip_verify: Option<bool>,
    /// Output format: text, json, table
    pub output: Option<String>,
    /// Exit code to use when a fetched certificate is expired
    pub exit_code: Option<i32>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus integration configuration.
///
/// Controls whether metrics are pushed to a Prometheus Push Gateway
/// and specifies the gateway address.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Default for Config {
    /// Creates a configuration with the built-in defaults.
    ///
    /// # Default Values
    ///
    /// - `hosts`: None (must be provided)
    /// - `port`: 443
    /// - `connect_timeout_ms`: 1000
    /// - `handshake_timeout_ms`: 5000
    /// - `insecure_skip_verify`: true (inspect any certificate)
    /// - `output`: "text"
    /// - `exit_code`: 0 (don't fail on expired certificates)
    /// - `prometheus.enabled`: false
    /// - `prometheus.address`: "http://localhost:9091"
    fn default() -> Self {
        Config {
            hosts: None,
            port: Some(DEFAULT_PORT),
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT.as_millis() as u64),
            handshake_timeout_ms: Some(DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64),
            insecure_skip_verify: Some(true),
            output: Some(OutputFormat::Text.to_string()),
            exit_code: Some(0),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use certfetch::config::Config;
    /// let config = Config::from_file("certfetch.toml")?;
    /// # Ok::<(), certfetch::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    ///
    /// # Example
    ///
    /// ```
    /// # use certfetch::config::Config;
    /// let defaults = Config::default();
    /// let file_config = Config::from_file("certfetch.toml").unwrap_or_default();
    /// let merged = defaults.merge_with(file_config);
    /// ```
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.hosts.is_some() {
            self.hosts = other.hosts;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.connect_timeout_ms.is_some() {
            self.connect_timeout_ms = other.connect_timeout_ms;
        }
        if other.handshake_timeout_ms.is_some() {
            self.handshake_timeout_ms = other.handshake_timeout_ms;
        }
        if other.insecure_skip_verify.is_some() {
            self.insecure_skip_verify = other.insecure_skip_verify;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Resolves the fetch options, falling back to the built-in defaults.
    ///
    /// Zero timeouts are rejected here so the CLI can report them before any
    /// host is contacted.
    pub fn fetch_options(&self) -> Result<FetchOptions, ConfigError> {
        let connect = self
            .connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let handshake = self
            .handshake_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);
        if connect.is_zero() || handshake.is_zero() {
            return Err(ConfigError::Validation(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(FetchOptions::default()
            .connect_timeout(connect)
            .handshake_timeout(handshake)
            .insecure_skip_verify(self.insecure_skip_verify.unwrap_or(true)))
    }

    /// Parses the configured output format.
    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        match &self.output {
            Some(output) => output
                .parse::<OutputFormat>()
                .map_err(|_| ConfigError::Validation(format!("unknown output format '{}'", output))),
            None => Ok(OutputFormat::Text),
        }
    }

    /// Returns the Push Gateway address when metrics pushing is enabled.
    pub fn prometheus_address(&self) -> Option<&str> {
        let prometheus = self.prometheus.as_ref()?;
        if prometheus.enabled.unwrap_or(false) {
            prometheus.address.as_deref()
        } else {
            None
        }
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// Creates a sample configuration with all available options set to
    /// example values. Useful for bootstrapping a new configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// # use certfetch::config::Config;
    /// let example = Config::example_toml();
    /// println!("{}", example);
    /// // Save to file: std::fs::write("certfetch.toml", example)?;
    /// ```
    pub fn example_toml() -> String {
        let example = Config {
            hosts: Some(vec![
                "example.com".to_string(),
                "example.com:8443".to_string(),
                "https://secure.example.com:9443".to_string(),
                "expired.badssl.com".to_string(),
            ]),
            port: Some(DEFAULT_PORT),
            connect_timeout_ms: Some(1000),
            handshake_timeout_ms: Some(5000),
            insecure_skip_verify: Some(true),
            output: Some(OutputFormat::Table.to_string()),
            exit_code: Some(1),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
