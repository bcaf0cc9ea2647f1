/* src/config.rs */
//! File-level configuration.
//!
//! [`DectConfig`] is what a YAML or JSON config file deserializes into. Every field has
//! a default, so a partial file is valid. The CLI layers its flags on top and then
//! calls [`DectConfig::run_config`] to obtain the immutable [`RunConfig`].
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::dispatch::RunConfig;
use crate::error::{DectError, Result};
use crate::model::MaterialModel;
use crate::quantize::OutputRepr;
use crate::real::Precision;
use crate::solver::{validate_min_step, Enhancement, DEFAULT_MIN_STEP};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DectConfig {
    /// Mixing coefficients.
    pub model: MaterialModel,
    /// Search settings.
    pub solver: SolverConfig,
    /// Output layout.
    pub output: OutputConfig,
    /// Device id: 0 CPU search, 1 CPU closed form, 2+ accelerator.
    pub device: u32,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Search solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Descent stopping threshold.
    pub min_step: f64,
    /// 1 (standard) or 3 (bias-cancelling).
    pub enhancement: Enhancement,
    /// Clamp measurements to the coefficient range first.
    pub pre_clamp: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self { min_step: DEFAULT_MIN_STEP, enhancement: Enhancement::Standard, pre_clamp: true }
    }
}

/// Output layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sample type of the fraction planes.
    pub repr: OutputRepr,
    /// Compute precision.
    pub precision: Precision,
    /// Rotate output by 180 degrees.
    pub mirror: bool,
    /// Weight of channel A in the merge plane.
    pub merge_ratio: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            repr: OutputRepr::U8,
            precision: Precision::Double,
            mirror: false,
            merge_ratio: 0.5,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
    /// Also write to a daily file under `directory`.
    pub file_logging: bool,
    /// Log file directory.
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_logging: false,
            directory: PathBuf::from("logs"),
        }
    }
}

/// Config file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// Anything else
    Json,
}

impl ConfigFormat {
    /// Pick the syntax from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

impl DectConfig {
    /// Parse config text.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: Self = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        validate_min_step(self.solver.min_step)
            .map_err(|e| DectError::Configuration(e.to_string()))?;
        let ratio = self.output.merge_ratio;
        if !(ratio.is_finite() && (0.0..=1.0).contains(&ratio)) {
            return Err(DectError::Configuration(format!(
                "output.merge_ratio must lie in [0, 1], got {ratio}"
            )));
        }
        Ok(())
    }

    /// Freeze into the per-run configuration.
    ///
    /// `with_merge` decides whether the merge plane is computed at all.
    pub fn run_config(&self, with_merge: bool) -> RunConfig {
        RunConfig {
            backend: BackendId::from(self.device),
            model: self.model,
            min_step: self.solver.min_step,
            enhancement: self.solver.enhancement,
            pre_clamp: self.solver.pre_clamp,
            precision: self.output.precision,
            repr: self.output.repr,
            mirror: self.output.mirror,
            merge_ratio: with_merge.then_some(self.output.merge_ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DectConfig::default();
        assert_eq!(config.model, MaterialModel::default());
        assert_eq!(config.solver.min_step, 0.001);
        assert!(config.solver.pre_clamp);
        assert_eq!(config.output.repr, OutputRepr::U8);
        assert_eq!(config.output.merge_ratio, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "solver:\n  enhancement: 3\noutput:\n  repr: u16\n  precision: single\ndevice: 1\n";
        let config = DectConfig::parse(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.solver.enhancement, Enhancement::BiasCancelling);
        assert_eq!(config.solver.min_step, DEFAULT_MIN_STEP);
        assert_eq!(config.output.repr, OutputRepr::U16);

        let run = config.run_config(false);
        assert_eq!(run.backend, BackendId::CpuClosedForm);
        assert_eq!(run.precision, Precision::Single);
        assert_eq!(run.merge_ratio, None);
    }

    #[test]
    fn test_json_model_and_validation() {
        let json = r#"{"model": {"alpha_a": 1, "beta_a": 2, "gamma_a": 3,
                                  "alpha_b": 4, "beta_b": 5, "gamma_b": 7}}"#;
        let config = DectConfig::parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.model.gamma_b, 7.0);
        assert_eq!(config.run_config(true).merge_ratio, Some(0.5));

        let bad = r#"{"output": {"merge_ratio": 2.0}}"#;
        assert!(matches!(
            DectConfig::parse(bad, ConfigFormat::Json),
            Err(DectError::Configuration(_))
        ));
        let bad = r#"{"solver": {"enhancement": 2}}"#;
        assert!(DectConfig::parse(bad, ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("run.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("run.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("run")), ConfigFormat::Json);
    }
}
