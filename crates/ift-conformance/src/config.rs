//! Suite configuration (`ift-conformance.toml`).
//!
//! Every section is optional; command-line flags override whatever the file
//! sets.
//!
//! ```toml
//! [server]
//! address = "http://localhost:8080"
//! font_path = "/fonts/Roboto.ttf"
//! use_get = false
//!
//! [font]
//! reference = "fonts/Roboto.ttf"
//!
//! [codepoints]
//! minimal = [0x41]
//! extend = [0x42, 0x43]
//!
//! [patch_tools]
//! vcdiff = ["xdelta3", "-d", "-s", "{base}", "{patch}", "{output}"]
//! brotli = ["brotli-patch", "{base}", "{patch}", "{output}"]
//!
//! [shaping]
//! seed = 7
//! rounds_per_codepoint = 4
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConformanceError, ConformanceResult};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConformanceConfig {
    pub server: ServerConfig,
    pub font: FontConfig,
    pub codepoints: CodepointConfig,
    pub patch_tools: PatchToolConfig,
    pub shaping: ShapingConfig,
}

/// The server under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Scheme, host and port.
    pub address: Option<String>,
    /// Path of a font the server serves.
    pub font_path: Option<String>,
    /// Path of a font the server does not have.
    pub not_found_path: String,
    /// Send requests as `GET ?request=`.
    pub use_get: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: None,
            font_path: None,
            not_found_path: "/notfound".to_string(),
            use_get: false,
            timeout_secs: 30,
        }
    }
}

/// The reference font.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FontConfig {
    /// Path to the original, unsubsetted font.
    pub reference: Option<PathBuf>,
}

/// Codepoints requested by the suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CodepointConfig {
    /// Requested by the first round.
    pub minimal: BTreeSet<u32>,
    /// Added by the extend round.
    pub extend: BTreeSet<u32>,
}

impl Default for CodepointConfig {
    fn default() -> Self {
        Self {
            minimal: BTreeSet::from([0x41]),
            extend: BTreeSet::from([0x42, 0x43]),
        }
    }
}

/// Argv templates for the command patch applier. `{base}`, `{patch}` and
/// `{output}` are replaced with file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PatchToolConfig {
    pub vcdiff: Option<Vec<String>>,
    pub brotli: Option<Vec<String>>,
}

/// Shaping comparison settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ShapingConfig {
    /// Seed for random strings and request bodies; random when unset.
    pub seed: Option<u64>,
    /// Random strings per codepoint in the compared set.
    pub rounds_per_codepoint: usize,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            seed: None,
            rounds_per_codepoint: 4,
        }
    }
}

impl ConformanceConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Io`] if the file cannot be read and
    /// [`ConformanceError::Config`] if it does not parse or validate.
    pub fn load(path: impl AsRef<Path>) -> ConformanceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::parse_str(&text).map_err(|e| match e {
            ConformanceError::Config(msg) => {
                ConformanceError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Config`] for TOML errors, unknown keys and
    /// failed validation.
    pub fn parse_str(text: &str) -> ConformanceResult<Self> {
        let config = Self::parse_str_unchecked(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config text without validation.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Config`] for TOML errors and unknown keys.
    pub fn parse_str_unchecked(text: &str) -> ConformanceResult<Self> {
        toml::from_str(text).map_err(|e| ConformanceError::Config(e.to_string()))
    }

    /// Check values that parse but make no sense.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Config`] naming the first bad value.
    pub fn validate(&self) -> ConformanceResult<()> {
        if let Some(address) = &self.server.address {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                return Err(ConformanceError::Config(format!(
                    "server.address must start with http:// or https://, got {address:?}"
                )));
            }
        }
        for (name, path) in [
            ("server.font_path", self.server.font_path.as_deref()),
            ("server.not_found_path", Some(self.server.not_found_path.as_str())),
        ] {
            if let Some(path) = path {
                if !path.starts_with('/') {
                    return Err(ConformanceError::Config(format!(
                        "{name} must start with '/', got {path:?}"
                    )));
                }
            }
        }
        if self.server.timeout_secs == 0 {
            return Err(ConformanceError::Config("server.timeout_secs must be positive".into()));
        }
        if self.codepoints.minimal.is_empty() {
            return Err(ConformanceError::Config("codepoints.minimal must not be empty".into()));
        }
        if let Some(cp) = self
            .codepoints
            .minimal
            .iter()
            .chain(&self.codepoints.extend)
            .find(|cp| char::from_u32(**cp).is_none())
        {
            return Err(ConformanceError::Config(format!(
                "codepoint {cp:#x} is not a Unicode scalar value"
            )));
        }
        for (name, argv) in [
            ("patch_tools.vcdiff", &self.patch_tools.vcdiff),
            ("patch_tools.brotli", &self.patch_tools.brotli),
        ] {
            if argv.as_ref().is_some_and(Vec::is_empty) {
                return Err(ConformanceError::Config(format!("{name} must not be empty")));
            }
        }
        if self.shaping.rounds_per_codepoint == 0 {
            return Err(ConformanceError::Config(
                "shaping.rounds_per_codepoint must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ConformanceConfig::parse_str("").unwrap();
        assert_eq!(config, ConformanceConfig::default());
        assert_eq!(config.server.not_found_path, "/notfound");
        assert_eq!(config.codepoints.minimal, BTreeSet::from([0x41]));
        assert_eq!(config.shaping.rounds_per_codepoint, 4);
    }

    #[test]
    fn full_file_parses() {
        let config = ConformanceConfig::parse_str(
            r#"
            [server]
            address = "http://localhost:8080"
            font_path = "/fonts/Roboto.ttf"
            use_get = true

            [font]
            reference = "Roboto.ttf"

            [codepoints]
            minimal = [0x41, 0x61]
            extend = [0x62]

            [patch_tools]
            vcdiff = ["xdelta3", "-d", "-s", "{base}", "{patch}", "{output}"]

            [shaping]
            seed = 7
            "#,
        )
        .unwrap();
        assert!(config.server.use_get);
        assert_eq!(config.font.reference, Some(PathBuf::from("Roboto.ttf")));
        assert_eq!(config.codepoints.minimal, BTreeSet::from([0x41, 0x61]));
        assert_eq!(config.patch_tools.vcdiff.unwrap().len(), 6);
        assert_eq!(config.shaping.seed, Some(7));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = ConformanceConfig::parse_str("[server]\nadress = \"http://x\"\n").unwrap_err();
        assert!(matches!(err, ConformanceError::Config(_)));
    }

    #[test]
    fn bad_values_rejected() {
        for text in [
            "[server]\naddress = \"localhost:8080\"\n",
            "[server]\nfont_path = \"fonts/x.ttf\"\n",
            "[server]\ntimeout_secs = 0\n",
            "[codepoints]\nminimal = []\n",
            "[codepoints]\nextend = [0xD800]\n",
            "[patch_tools]\nbrotli = []\n",
            "[shaping]\nrounds_per_codepoint = 0\n",
        ] {
            assert!(ConformanceConfig::parse_str(text).is_err(), "{text}");
        }
    }

    #[test]
    fn load_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[nope]\n").unwrap();
        let err = ConformanceConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
