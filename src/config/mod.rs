//! Lane configuration
//!
//! Three layers, later ones winning:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`, or `compile-lane.toml` if present)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, LaneConfig, ToolchainSection,
};
pub use merge::{merge_into, merge_layers};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "compile-lane.toml";
