//! Output formats and compilation targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Closed set of artifact formats the toolchain can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// WebAssembly module runnable by the in-browser simulator
    Wasm,
    Elf,
    Hex,
    Uf2,
}

/// How the toolchain is driven for a given format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Build a simulator module, tagging the build with the board name.
    Simulate,
    /// Build a binary image for the target board.
    Firmware,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Wasm,
        OutputFormat::Elf,
        OutputFormat::Hex,
        OutputFormat::Uf2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Wasm => "wasm",
            OutputFormat::Elf => "elf",
            OutputFormat::Hex => "hex",
            OutputFormat::Uf2 => "uf2",
        }
    }

    /// File extension used for artifacts of this format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mode(&self) -> InvocationMode {
        match self {
            OutputFormat::Wasm => InvocationMode::Simulate,
            OutputFormat::Elf | OutputFormat::Hex | OutputFormat::Uf2 => InvocationMode::Firmware,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownFormat(s.to_string()))
    }
}

/// Compilation target: a board name, or the simulator sentinel.
///
/// Target names end up inside cache file names, so only ASCII
/// alphanumerics, `-`, `_` and `.` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();
        let valid_chars = name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if name.is_empty() || !valid_chars || name == "." || name == ".." {
            return Err(ProtocolError::InvalidTarget(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build tag passed to the toolchain in simulate mode (`-` becomes `_`).
    pub fn build_tag(&self) -> String {
        self.0.replace('-', "_")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Target {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::new(s)
    }
}

impl TryFrom<String> for Target {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_closed_set() {
        assert_eq!("wasm".parse::<OutputFormat>().unwrap(), OutputFormat::Wasm);
        assert_eq!("elf".parse::<OutputFormat>().unwrap(), OutputFormat::Elf);
        assert_eq!("hex".parse::<OutputFormat>().unwrap(), OutputFormat::Hex);
        assert_eq!("uf2".parse::<OutputFormat>().unwrap(), OutputFormat::Uf2);
        assert_eq!(
            "bin".parse::<OutputFormat>(),
            Err(ProtocolError::UnknownFormat("bin".to_string()))
        );
        assert!("WASM".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_format_modes() {
        assert_eq!(OutputFormat::Wasm.mode(), InvocationMode::Simulate);
        for format in [OutputFormat::Elf, OutputFormat::Hex, OutputFormat::Uf2] {
            assert_eq!(format.mode(), InvocationMode::Firmware);
        }
    }

    #[test]
    fn test_format_serde_lowercase() {
        let json = serde_json::to_string(&OutputFormat::Uf2).unwrap();
        assert_eq!(json, "\"uf2\"");
    }

    #[test]
    fn test_target_validation() {
        assert!(Target::new("arduino-nano33").is_ok());
        assert!(Target::new("pico").is_ok());
        assert!(Target::new("wasm").is_ok());
        assert!(Target::new("").is_err());
        assert!(Target::new("..").is_err());
        assert!(Target::new("../etc").is_err());
        assert!(Target::new("a/b").is_err());
        assert!(Target::new("a b").is_err());
    }

    #[test]
    fn test_build_tag_sanitized() {
        let target = Target::new("arduino-nano-33").unwrap();
        assert_eq!(target.build_tag(), "arduino_nano_33");
    }

    #[test]
    fn test_target_deserialize_validates() {
        let ok: Target = serde_json::from_str("\"microbit\"").unwrap();
        assert_eq!(ok.as_str(), "microbit");
        assert!(serde_json::from_str::<Target>("\"x/y\"").is_err());
    }
}
