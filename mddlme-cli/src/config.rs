//! TOML configuration and command-line overrides

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use mddlme_simplification::{BorderMatching, PipelineConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Target ratio used when neither the command line nor the config sets one.
pub const DEFAULT_TARGET_RATIO: f32 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Settings loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MddlmeConfig {
    /// Fraction of vertices to retain
    pub target_ratio: Option<f32>,
    /// Log verbosity
    pub log_level: Option<LogLevel>,
    /// Pipeline block
    pub pipeline: PipelineConfig,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),
    #[error("input path is not a file: {0}")]
    InputNotFile(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    ConfigRead { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse { path: PathBuf, source: toml::de::Error },
    #[error("proximity tolerance must be positive, got {0}")]
    InvalidTolerance(f32),
}

impl CliError {
    pub fn suggestion(&self) -> &'static str {
        match self {
            CliError::InputMissing(_) => "Verify the input path and ensure the file exists.",
            CliError::InputNotFile(_) => "Provide a mesh file path (not a directory).",
            CliError::ConfigRead { .. } => "Verify the config path and file permissions.",
            CliError::ConfigParse { .. } => "Fix TOML syntax and ensure fields match the schema.",
            CliError::InvalidTolerance(_) => "Pass a small positive distance, e.g. --proximity 1e-5.",
        }
    }
}

/// Pipeline-related command-line flags that override the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_ratio: Option<f32>,
    pub partitions: Option<usize>,
    pub threads: Option<usize>,
    pub sequential: bool,
    pub proximity: Option<f32>,
}

pub fn load_config(path: Option<&Path>) -> Result<MddlmeConfig, CliError> {
    let Some(path) = path else {
        return Ok(MddlmeConfig::default());
    };
    let content = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| CliError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn check_input(path: &Path) -> Result<(), CliError> {
    if !path.exists() {
        return Err(CliError::InputMissing(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(CliError::InputNotFile(path.to_path_buf()));
    }
    Ok(())
}

/// Log level precedence: flag, then `RUST_LOG`, then config, then info.
pub fn resolve_log_level(flag: Option<LogLevel>, config: &MddlmeConfig) -> String {
    if let Some(level) = flag {
        return level.as_str().to_string();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        if !level.trim().is_empty() {
            return level;
        }
    }

    if let Some(level) = config.log_level {
        return level.as_str().to_string();
    }

    "info".to_string()
}

/// Apply command-line overrides and describe what changed.
pub fn apply_overrides(config: &mut MddlmeConfig, overrides: &Overrides) -> Result<Vec<String>, CliError> {
    let mut applied = Vec::new();

    if let Some(ratio) = overrides.target_ratio {
        if config.target_ratio != Some(ratio) {
            applied.push(format!("target_ratio = {}", ratio));
        }
        config.target_ratio = Some(ratio);
    }

    if let Some(partitions) = overrides.partitions {
        if config.pipeline.num_partitions != partitions {
            applied.push(format!("num_partitions = {}", partitions));
        }
        config.pipeline.num_partitions = partitions;
    }

    if let Some(threads) = overrides.threads {
        applied.push(format!("num_threads = {}", threads));
        config.pipeline.parallel.num_threads = Some(threads);
    }

    if overrides.sequential && config.pipeline.parallel.enabled {
        applied.push("parallel = false".to_string());
        config.pipeline.parallel.enabled = false;
    }

    if let Some(tolerance) = overrides.proximity {
        if tolerance.is_nan() || tolerance <= 0.0 {
            return Err(CliError::InvalidTolerance(tolerance));
        }
        applied.push(format!("border_matching = proximity({})", tolerance));
        config.pipeline.border_matching = BorderMatching::Proximity { tolerance };
    }

    Ok(applied)
}
