// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Mapper Configuration Types
//
// Defines the configuration schema for a queue mapping manager instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Device resource pool sizes
// - Reconciliation worker polling
//
// Per-resource request configs (DomainConfig, QueueConfig, PortConfig) live
// here as well since the directory validates them against DeviceConfig.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "qidmap/v1";
pub const KIND: &str = "MapperConfig";

/// Top-level mapper configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfigManifest {
    /// API version (must be "qidmap/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MapperConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: MapperConfigSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperConfigSpec {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

/// Resource pool sizes of the event device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_num_domains")]
    pub num_domains: u32,

    #[serde(default = "default_num_queues")]
    pub num_queues: u32,

    #[serde(default = "default_num_ports")]
    pub num_ports: u32,

    /// Largest per-queue inflight limit the device supports
    #[serde(default = "default_max_inflight_limit")]
    pub max_inflight_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Delay between passes while work is still pending
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ReconciliationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Resources requested for a new scheduling domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub num_queues: u32,
    pub num_ports: u32,
}

/// Configuration applied when a queue is configured in its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_inflight_limit")]
    pub inflight_limit: u32,
}

/// Configuration applied when a port is configured in its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_num_domains() -> u32 {
    32
}

fn default_num_queues() -> u32 {
    32
}

fn default_num_ports() -> u32 {
    64
}

fn default_max_inflight_limit() -> u32 {
    2048
}

fn default_queue_inflight_limit() -> u32 {
    64
}

fn default_poll_interval_ms() -> u64 {
    1
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_domains: default_num_domains(),
            num_queues: default_num_queues(),
            num_ports: default_num_ports(),
            max_inflight_limit: default_max_inflight_limit(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms() }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { inflight_limit: default_queue_inflight_limit() }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for MapperConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "qidmap".to_string(),
                version: None,
            },
            spec: MapperConfigSpec::default(),
        }
    }
}

impl MapperConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. QIDMAP_CONFIG_PATH environment variable
    /// 2. ./qidmap-config.yaml (working directory)
    /// 3. ~/.qidmap/config.yaml (user home)
    /// 4. /etc/qidmap/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("QIDMAP_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./qidmap-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".qidmap").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/qidmap/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config =
                Self::from_yaml_file(&path).context("Failed to load explicitly configured file")?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("QIDMAP_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: QIDMAP_POLL_INTERVAL_MS={}", ms);
                    self.spec.reconciliation.poll_interval_ms = ms;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for QIDMAP_POLL_INTERVAL_MS: '{}'. Expected milliseconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let device = &self.spec.device;
        if device.num_domains == 0 {
            anyhow::bail!("spec.device.num_domains must be at least 1");
        }
        if device.num_queues == 0 || device.num_ports == 0 {
            anyhow::bail!("spec.device must provide at least one queue and one port");
        }
        if device.max_inflight_limit == 0 {
            anyhow::bail!("spec.device.max_inflight_limit must be greater than zero");
        }

        if self.spec.reconciliation.poll_interval_ms == 0 {
            anyhow::bail!("spec.reconciliation.poll_interval_ms must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = MapperConfigManifest::default();
        assert_eq!(manifest.api_version, "qidmap/v1");
        assert_eq!(manifest.kind, "MapperConfig");
        assert_eq!(manifest.spec.device.num_ports, 64);
        assert_eq!(manifest.spec.device.num_queues, 32);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: qidmap/v1
kind: MapperConfig
metadata:
  name: edge-node
spec:
  device:
    num_ports: 16
"#;
        let manifest = MapperConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "edge-node");
        assert_eq!(manifest.spec.device.num_ports, 16);
        assert_eq!(manifest.spec.device.num_queues, 32);
        assert_eq!(manifest.spec.reconciliation.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_validation() {
        let mut manifest = MapperConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = MapperConfigManifest::default();
        manifest.spec.device.num_ports = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = MapperConfigManifest::default();
        manifest.spec.reconciliation.poll_interval_ms = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qidmap-config.yaml");

        let mut manifest = MapperConfigManifest::default();
        manifest.metadata.name = "lab".to_string();
        manifest.spec.device.num_domains = 4;
        manifest.to_yaml_file(&path).unwrap();

        let loaded = MapperConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "lab");
        assert_eq!(loaded.spec.device.num_domains, 4);
    }

    #[test]
    fn test_yaml_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "apiVersion: [unterminated").unwrap();

        let err = MapperConfigManifest::from_yaml_file(&path).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to parse config file"), "{}", message);
        assert!(message.contains("broken.yaml"), "{}", message);

        let err = MapperConfigManifest::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = MapperConfigManifest::load_or_default(Some(dir.path().join("missing.yaml")));
        assert!(result.is_err());
    }
}
