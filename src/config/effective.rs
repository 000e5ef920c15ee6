//! Effective configuration with provenance
//!
//! Layers are merged as JSON values, then deserialized into [`LaneConfig`]
//! and validated. Each contributing file is recorded with its SHA-256 digest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lane_worker::{ToolchainConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Toolchain section of the lane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    pub program: String,
    pub base_args: Vec<String>,
    pub termination_grace_ms: u64,
    pub poll_interval_ms: u64,
}

/// Typed lane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneConfig {
    pub cache_dir: PathBuf,
    pub cache_budget_bytes: u64,
    pub evict_every: u64,
    pub toolchain: ToolchainSection,
}

impl LaneConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            cache_budget_bytes: self.cache_budget_bytes,
            evict_every: self.evict_every,
        }
    }

    pub fn toolchain_config(&self) -> ToolchainConfig {
        ToolchainConfig {
            program: self.toolchain.program.clone(),
            base_args: self.toolchain.base_args.clone(),
            termination_grace: Duration::from_millis(self.toolchain.termination_grace_ms),
            poll_interval: Duration::from_millis(self.toolchain.poll_interval_ms.max(1)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_budget_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "cache_budget_bytes must be greater than 0".to_string(),
            ));
        }
        if self.toolchain.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "toolchain.program must not be empty".to_string(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            cache_dir: defaults.cache_dir,
            cache_budget_bytes: defaults.cache_budget_bytes,
            evict_every: defaults.evict_every,
            toolchain: ToolchainSection {
                program: defaults.toolchain_program,
                base_args: defaults.toolchain_base_args,
                termination_grace_ms: defaults.termination_grace_ms,
                poll_interval_ms: defaults.poll_interval_ms,
            },
        }
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config: LaneConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build effective config from builtin defaults, an optional TOML file
    /// and CLI overrides (highest precedence).
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: LaneConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        config.validate()?;

        Ok(Self { config, sources })
    }

    /// Use `explicit` if given, else `default_name` in the working directory if it exists.
    pub fn resolve_path(explicit: Option<PathBuf>, default_name: &str) -> Option<PathBuf> {
        explicit.or_else(|| {
            let candidate = PathBuf::from(default_name);
            candidate.is_file().then_some(candidate)
        })
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let table: toml::Table = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml::Value::Table(table)), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
