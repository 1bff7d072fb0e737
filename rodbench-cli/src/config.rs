//! Configuration loading from rod.toml
//!
//! The file is discovered by walking up from the current directory, or named
//! with `--config`. Every field has a default; command-line flags override
//! whatever the file sets.

use crate::sampler::{SamplerParams, StrategyKind};
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name searched for by [`RodConfig::discover`]
pub const CONFIG_FILE: &str = "rod.toml";

/// rodbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RodConfig {
    /// Sampling configuration
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Host session configuration
    #[serde(default)]
    pub host: HostConfig,
    /// Report configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Sampling strategy and its knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// "two-point" or "regression"
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Trials per regime
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Second iteration count of the two-point strategy
    #[serde(default = "default_probe")]
    pub probe: u64,
    /// Largest acceptable overhead share, in (0, 1)
    #[serde(default = "default_target")]
    pub target: f64,
    /// Calibration budget of the regression strategy (e.g. "2s")
    #[serde(default = "default_calibration")]
    pub calibration: String,
    /// Calibration never exceeds this count
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Fixed seed for the iteration schedule
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            trials: default_trials(),
            probe: default_probe(),
            target: default_target(),
            calibration: default_calibration(),
            max_iterations: default_max_iterations(),
            seed: None,
        }
    }
}

fn default_trials() -> usize {
    100
}
fn default_probe() -> u64 {
    2
}
fn default_target() -> f64 {
    0.01
}
fn default_calibration() -> String {
    "2s".to_string()
}
fn default_max_iterations() -> u64 {
    1_000_000_000
}

impl SamplerConfig {
    /// Reject settings no strategy can work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trials == 0 {
            bail!("sampler.trials must be at least 1");
        }
        if self.probe < 2 {
            bail!("sampler.probe must be at least 2, got {}", self.probe);
        }
        if !(self.target > 0.0 && self.target < 1.0) {
            bail!("sampler.target must be in (0, 1), got {}", self.target);
        }
        if self.max_iterations == 0 {
            bail!("sampler.max_iterations must be at least 1");
        }
        if RodConfig::parse_duration(&self.calibration)? == 0 {
            bail!("sampler.calibration must be positive");
        }
        Ok(())
    }

    /// Validated parameters for the strategies
    pub fn params(&self) -> anyhow::Result<SamplerParams> {
        self.validate()?;
        Ok(SamplerParams {
            trials: self.trials,
            probe: self.probe,
            target: self.target,
            calibration: Duration::from_nanos(RodConfig::parse_duration(&self.calibration)?),
            max_iterations: self.max_iterations,
            seed: self.seed,
        })
    }
}

/// Settings applied to each host session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Default worker count per run
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Report allocation columns for every run
    #[serde(default)]
    pub benchmem: bool,
    /// How long a spawned host may take to print PASS
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            benchmem: false,
            startup_timeout: default_startup_timeout(),
        }
    }
}

fn default_parallelism() -> u32 {
    1
}
fn default_startup_timeout() -> String {
    "30s".to_string()
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text for terminals
    #[default]
    Human,
    /// One JSON document
    Json,
}

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// "human" or "json"
    #[serde(default)]
    pub format: OutputFormat,
    /// Print the running moments after every trial
    #[serde(default = "default_show_trials")]
    pub show_trials: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            show_trials: default_show_trials(),
        }
    }
}

fn default_show_trials() -> bool {
    true
}

impl RodConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Find `rod.toml` in the current directory or one of its parents
    pub fn find() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Load the discovered file, or defaults when there is none
    pub fn discover() -> anyhow::Result<Self> {
        match Self::find() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Startup timeout for spawned hosts
    pub fn startup_timeout(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_nanos(Self::parse_duration(
            &self.host.startup_timeout,
        )?))
    }

    /// Default configuration as a TOML string
    pub fn default_toml() -> String {
        r#"# rodbench configuration

[sampler]
# "two-point" or "regression"
strategy = "two-point"
# Trials per regime
trials = 100
# Second iteration count of the two-point strategy
probe = 2
# Largest acceptable overhead share of total time
target = 0.01
# Calibration budget of the regression strategy
calibration = "2s"
max_iterations = 1000000000
# Fixed seed for reproducible schedules (uncomment to enable)
# seed = 42

[host]
# Default worker count per run
parallelism = 1
# Report B/op and allocs/op for every run
benchmem = false
# How long a spawned host may take to print PASS
startup_timeout = "30s"

[output]
# "human" or "json"
format = "human"
# Print running moments after every trial
show_trials = true
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty duration string");
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            bail!("invalid duration: {}", s);
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => bail!("unknown duration unit: {}", unit_part),
        };

        Ok((value * multiplier as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RodConfig::default();
        assert_eq!(config.sampler.strategy, StrategyKind::TwoPoint);
        assert_eq!(config.sampler.trials, 100);
        assert_eq!(config.sampler.probe, 2);
        assert_eq!(config.host.parallelism, 1);
        assert_eq!(config.output.format, OutputFormat::Human);
        assert!(config.output.show_trials);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(RodConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(RodConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(RodConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(RodConfig::parse_duration("1000ns").unwrap(), 1000);
        assert_eq!(RodConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(RodConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(RodConfig::parse_duration("4").unwrap(), 4_000_000_000);
        assert!(RodConfig::parse_duration("").is_err());
        assert!(RodConfig::parse_duration("3h").is_err());
        assert!(RodConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [sampler]
            strategy = "regression"
            trials = 20
            seed = 9

            [output]
            format = "json"
        "#;

        let config: RodConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sampler.strategy, StrategyKind::Regression);
        assert_eq!(config.sampler.trials, 20);
        assert_eq!(config.sampler.seed, Some(9));
        assert_eq!(config.output.format, OutputFormat::Json);
        // Defaults should still apply
        assert_eq!(config.sampler.calibration, "2s");
        assert_eq!(config.host.startup_timeout, "30s");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: RodConfig = toml::from_str(&RodConfig::default_toml()).unwrap();
        assert_eq!(config.sampler.strategy, StrategyKind::TwoPoint);
        assert_eq!(config.sampler.seed, None);
        assert_eq!(config.startup_timeout().unwrap(), Duration::from_secs(30));
        let params = config.sampler.params().unwrap();
        assert_eq!(params, SamplerParams::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut sampler = SamplerConfig::default();
        assert!(sampler.validate().is_ok());

        sampler.probe = 1;
        assert!(sampler.validate().is_err());
        sampler.probe = 2;

        sampler.trials = 0;
        assert!(sampler.validate().is_err());
        sampler.trials = 10;

        for target in [0.0, 1.0, -0.5, f64::NAN] {
            sampler.target = target;
            assert!(sampler.validate().is_err(), "target {}", target);
        }
        sampler.target = 0.05;

        sampler.calibration = "0s".to_string();
        assert!(sampler.validate().is_err());
        sampler.calibration = "1s".to_string();

        sampler.max_iterations = 0;
        assert!(sampler.validate().is_err());
    }
}
