//! Configuration loading from TOML files
//!
//! Config file is selected via the `--config` command line argument
//! (default: config/dev.toml). A missing or unparseable file falls back to
//! compiled-in defaults with a warning; zone provisioning, broker address,
//! and timing windows all live here.

use crate::domain::ZoneClass;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceSection {
    /// Device/host identifier used in every topic. Empty = derive from the
    /// system hostname.
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self { host: default_mqtt_host(), port: default_mqtt_port(), username: None, password: None }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_prefix")]
    pub prefix: String,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self { prefix: default_discovery_prefix() }
    }
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self { interval_ms: default_poll_interval_ms(), debounce_ms: default_debounce_ms() }
    }
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_debounce_ms() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputsSection {
    /// Momentary (output_tap) pulse duration
    #[serde(default = "default_tap_ms")]
    pub tap_ms: u64,
}

impl Default for OutputsSection {
    fn default() -> Self {
        Self { tap_ms: default_tap_ms() }
    }
}

fn default_tap_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    /// Candidate directories in preference order; `~` expands to $HOME
    #[serde(default = "default_persistence_dirs")]
    pub dirs: Vec<String>,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self { dirs: default_persistence_dirs() }
    }
}

fn default_persistence_dirs() -> Vec<String> {
    vec![
        "/var/lib/zone-bridge".to_string(),
        "/etc/zone-bridge".to_string(),
        "~/.config/zone-bridge".to_string(),
    ]
}

/// One provisioned zone: stable key, display name, fixed BCM pin, default
/// class (overridden by the persisted mapping at startup)
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSpec {
    pub key: String,
    pub name: String,
    pub pin: u8,
    #[serde(default = "default_zone_class")]
    pub class: ZoneClass,
}

fn default_zone_class() -> ZoneClass {
    ZoneClass::Opening
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub outputs: OutputsSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default = "default_zone_table", rename = "zone")]
    pub zones: Vec<ZoneSpec>,
}

fn default_zone_table() -> Vec<ZoneSpec> {
    let pins: [u8; 10] = [22, 25, 5, 6, 12, 13, 16, 18, 17, 23];
    pins.iter()
        .enumerate()
        .map(|(i, &pin)| ZoneSpec {
            key: format!("zone{}", i + 1),
            name: format!("Zone {}", i + 1),
            pin,
            class: ZoneClass::Opening,
        })
        .collect()
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    device_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    discovery_prefix: String,
    poll_interval_ms: u64,
    debounce_ms: u64,
    tap_ms: u64,
    persistence_dirs: Vec<PathBuf>,
    zones: Vec<ZoneSpec>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: system_device_id(),
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_username: None,
            mqtt_password: None,
            discovery_prefix: default_discovery_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            tap_ms: default_tap_ms(),
            persistence_dirs: default_persistence_dirs().iter().map(|d| expand_home(d)).collect(),
            zones: default_zone_table(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let device_id = if toml_config.device.id.trim().is_empty() {
            system_device_id()
        } else {
            slugify(&toml_config.device.id)
        };

        Ok(Self {
            device_id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            discovery_prefix: toml_config.discovery.prefix,
            poll_interval_ms: toml_config.poll.interval_ms,
            debounce_ms: toml_config.poll.debounce_ms,
            tap_ms: toml_config.outputs.tap_ms,
            persistence_dirs: toml_config.persistence.dirs.iter().map(|d| expand_home(d)).collect(),
            zones: toml_config.zones,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn discovery_prefix(&self) -> &str {
        &self.discovery_prefix
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tap_duration(&self) -> Duration {
        Duration::from_millis(self.tap_ms)
    }

    pub fn persistence_dirs(&self) -> &[PathBuf] {
        &self.persistence_dirs
    }

    pub fn zones(&self) -> &[ZoneSpec] {
        &self.zones
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the device id
    #[cfg(test)]
    pub fn with_device_id(mut self, id: &str) -> Self {
        self.device_id = slugify(id);
        self
    }
}

/// Lowercase, keep [a-z0-9_], collapse runs of anything else to one '_'
fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
            last_underscore = c == '_';
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "zonebridge".to_string()
    } else {
        trimmed
    }
}

/// Device id from the system hostname, best-effort
fn system_device_id() -> String {
    let from_env = std::env::var("HOSTNAME").ok();
    let from_file = fs::read_to_string("/etc/hostname").ok();
    let raw = from_env
        .or(from_file)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "zonebridge".to_string());
    slugify(&raw)
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(dir)
}
