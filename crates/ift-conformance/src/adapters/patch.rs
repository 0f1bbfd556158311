//! Patch application through external tools.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use ift_wire::PatchFormat;
use tracing::debug;

use crate::capabilities::PatchApplier;
use crate::config::PatchToolConfig;
use crate::error::{ConformanceError, ConformanceResult};

/// Runs a configured command per patch format.
///
/// Each argv template may use `{base}`, `{patch}` and `{output}`; they are
/// replaced by paths inside a fresh temporary directory.
#[derive(Debug, Clone, Default)]
pub struct CommandPatchApplier {
    tools: BTreeMap<PatchFormat, Vec<String>>,
}

impl CommandPatchApplier {
    /// An applier with no tools configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `argv` for `format`.
    #[must_use]
    pub fn with_tool(mut self, format: PatchFormat, argv: Vec<String>) -> Self {
        self.tools.insert(format, argv);
        self
    }

    /// An applier for the tools named in the config.
    #[must_use]
    pub fn from_config(config: &PatchToolConfig) -> Self {
        let mut applier = Self::new();
        for (format, argv) in [
            (PatchFormat::VcDiff, &config.vcdiff),
            (PatchFormat::Brotli, &config.brotli),
        ] {
            if let Some(argv) = argv {
                applier = applier.with_tool(format, argv.clone());
            }
        }
        applier
    }
}

fn substitute(arg: &str, base: &Path, patch: &Path, output: &Path) -> String {
    arg.replace("{base}", &base.to_string_lossy())
        .replace("{patch}", &patch.to_string_lossy())
        .replace("{output}", &output.to_string_lossy())
}

impl PatchApplier for CommandPatchApplier {
    fn apply(&self, base: &[u8], patch: &[u8], format: PatchFormat) -> ConformanceResult<Vec<u8>> {
        let argv = self
            .tools
            .get(&format)
            .ok_or_else(|| ConformanceError::PatchApplicationFailure {
                reason: format!("no tool configured for {format} patches"),
            })?;
        let Some((program, args)) = argv.split_first() else {
            return Err(ConformanceError::PatchApplicationFailure {
                reason: format!("empty command for {format} patches"),
            });
        };

        let dir = tempfile::tempdir()?;
        let base_path = dir.path().join("base");
        let patch_path = dir.path().join("patch");
        let output_path = dir.path().join("output");
        std::fs::write(&base_path, base)?;
        std::fs::write(&patch_path, patch)?;

        let args: Vec<String> = args
            .iter()
            .map(|arg| substitute(arg, &base_path, &patch_path, &output_path))
            .collect();
        debug!(program = %program, ?args, %format, "running patch tool");

        let output = Command::new(program).args(&args).output().map_err(|e| {
            ConformanceError::PatchApplicationFailure {
                reason: format!("cannot run {program}: {e}"),
            }
        })?;
        if !output.status.success() {
            return Err(ConformanceError::PatchApplicationFailure {
                reason: format!(
                    "{program} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let patched = std::fs::read(&output_path).map_err(|e| {
            ConformanceError::PatchApplicationFailure {
                reason: format!("{program} wrote no output: {e}"),
            }
        })?;
        if patched.is_empty() {
            return Err(ConformanceError::PatchApplicationFailure {
                reason: format!("{program} produced an empty font"),
            });
        }
        Ok(patched)
    }
}
