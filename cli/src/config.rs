use std::fs;
use std::path::PathBuf;

use sentinel_health::{
    ColumnMapping, EstimatorConfig, FitWindow, DEFAULT_ALERT_THRESHOLD_CYCLES,
    DEFAULT_EOL_THRESHOLD,
};
use sentinel_protocol::EstimatorParams;
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" => LogLevel::Off,
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("eol_threshold must be a positive number of amp-hours, got {0}")]
    InvalidEolThreshold(f64),

    #[error("sensor_columns.{0} needs at least one candidate column name")]
    EmptyColumnCandidates(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Metadata table, relative paths resolve against the working directory.
    pub metadata_path: PathBuf,
    /// Directory holding the per-cycle sensor logs.
    pub data_dir: PathBuf,
    pub eol_threshold: f64,
    pub alert_threshold_cycles: u64,
    pub fit_window: FitWindow,
    pub log_level: LogLevel,
    pub sensor_columns: ColumnMapping,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("metadata.csv"),
            data_dir: PathBuf::from("data_sample"),
            eol_threshold: DEFAULT_EOL_THRESHOLD,
            alert_threshold_cycles: DEFAULT_ALERT_THRESHOLD_CYCLES,
            fit_window: FitWindow::All,
            log_level: LogLevel::Warn,
            sensor_columns: ColumnMapping::default(),
        }
    }
}

/// Per-invocation values from the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub metadata_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub eol_threshold: Option<f64>,
    pub alert_threshold_cycles: Option<u64>,
    pub fit_window: Option<FitWindow>,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("sentinel")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sentinel")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())
}

impl UserConfig {
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!(
                    "Warning: ignoring invalid config {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save(&self) -> std::io::Result<()> {
        let _ = ensure_dirs();
        let path = config_path();
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }

    pub fn merge_with_args(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.metadata_path {
            self.metadata_path = path.clone();
        }
        if let Some(dir) = &overrides.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(threshold) = overrides.eol_threshold {
            self.eol_threshold = threshold;
        }
        if let Some(cycles) = overrides.alert_threshold_cycles {
            self.alert_threshold_cycles = cycles;
        }
        if let Some(window) = overrides.fit_window {
            self.fit_window = window;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.eol_threshold.is_finite() || self.eol_threshold <= 0.0 {
            return Err(ConfigError::InvalidEolThreshold(self.eol_threshold));
        }
        if self.sensor_columns.voltage.is_empty() {
            return Err(ConfigError::EmptyColumnCandidates("voltage"));
        }
        if self.sensor_columns.temperature.is_empty() {
            return Err(ConfigError::EmptyColumnCandidates("temperature"));
        }
        Ok(())
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            eol_threshold: self.eol_threshold,
            alert_threshold_cycles: self.alert_threshold_cycles,
            fit_window: self.fit_window,
        }
    }

    pub fn estimator_params(&self) -> EstimatorParams {
        EstimatorParams {
            eol_threshold_ah: self.eol_threshold,
            alert_threshold_cycles: self.alert_threshold_cycles,
            fit_window: self.fit_window.to_string(),
        }
    }
}

/// Rebuilds an estimator configuration from request parameters.
pub fn estimator_config_from_params(params: &EstimatorParams) -> Result<EstimatorConfig, String> {
    if !params.eol_threshold_ah.is_finite() || params.eol_threshold_ah <= 0.0 {
        return Err(ConfigError::InvalidEolThreshold(params.eol_threshold_ah).to_string());
    }
    Ok(EstimatorConfig {
        eol_threshold: params.eol_threshold_ah,
        alert_threshold_cycles: params.alert_threshold_cycles,
        fit_window: params.fit_window.parse()?,
    })
}
