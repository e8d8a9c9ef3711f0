use serde::{Deserialize, Serialize};

use crate::version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Healthy,
    Urgent,
}

impl AlertLevel {
    pub fn label(&self) -> &'static str {
        match self {
            AlertLevel::Healthy => "HEALTHY",
            AlertLevel::Urgent => "URGENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HealthSnapshot {
    pub battery_id: String,
    pub state_of_health_pct: f64,
    pub baseline_capacity_ah: f64,
    pub latest_capacity_ah: f64,
    pub current_cycle: u32,
    /// `None` when the trend is flat or rising.
    pub remaining_cycles: Option<u64>,
    pub predicted_end_cycle: Option<f64>,
    pub trend_slope: Option<f64>,
    pub trend_intercept: Option<f64>,
    pub ambient_temperature_c: Option<f64>,
    pub alert: AlertLevel,
    pub eol_threshold_ah: f64,
    pub alert_threshold_cycles: u64,
}

impl HealthSnapshot {
    pub fn soh_delta(&self) -> f64 {
        self.state_of_health_pct - 100.0
    }

    pub fn remaining_display(&self) -> String {
        match self.remaining_cycles {
            Some(n) => format!("{} Cycles", n),
            None => "Unbounded".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclePoint {
    pub cycle: u32,
    pub capacity_ah: f64,
}

/// Two points on the fitted trend line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub start_cycle: f64,
    pub start_capacity_ah: f64,
    pub end_cycle: f64,
    pub end_capacity_ah: f64,
}

impl ForecastSnapshot {
    /// Capacity on the trend line at `cycle`.
    pub fn value_at(&self, cycle: f64) -> f64 {
        let span = self.end_cycle - self.start_cycle;
        if span == 0.0 {
            return self.start_capacity_ah;
        }
        let slope = (self.end_capacity_ah - self.start_capacity_ah) / span;
        self.start_capacity_ah + slope * (cycle - self.start_cycle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrendSnapshot {
    pub battery_id: String,
    pub observed: Vec<CyclePoint>,
    pub forecast: Option<ForecastSnapshot>,
    pub eol_threshold_ah: f64,
    pub fit_window: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySummary {
    pub battery_id: String,
    pub cycle_count: usize,
    pub latest_capacity_ah: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub test_id: String,
    pub test_type: String,
    pub filename: String,
    pub capacity_ah: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub column: String,
    pub unit: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first: f64,
    pub last: f64,
    /// Every parsed sample, in file order.
    #[serde(default)]
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLogSnapshot {
    pub filename: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub voltage: Option<ChannelStats>,
    pub temperature: Option<ChannelStats>,
    pub current: Option<ChannelStats>,
    /// Raw cells of every row, aligned with `columns`.
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedBattery {
    pub battery_id: String,
    pub reason: String,
}

/// Health of every battery in the fleet, as exported or served in bulk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetReport {
    pub generated_at: i64,
    pub eol_threshold_ah: f64,
    pub alert_threshold_cycles: u64,
    pub fit_window: String,
    pub batteries: Vec<HealthSnapshot>,
    pub skipped: Vec<SkippedBattery>,
}

impl Default for FleetReport {
    fn default() -> Self {
        Self {
            generated_at: chrono::Utc::now().timestamp(),
            eol_threshold_ah: 0.0,
            alert_threshold_cycles: 0,
            fit_window: "all".to_string(),
            batteries: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl FleetReport {
    pub fn urgent_count(&self) -> usize {
        self.batteries
            .iter()
            .filter(|b| b.alert == AlertLevel::Urgent)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub metadata_path: String,
    pub battery_count: usize,
    pub row_count: usize,
    pub loaded_at: i64,
    pub requests_served: u64,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    #[serde(default = "default_min_supported_version")]
    pub min_supported_version: u32,
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_min_supported_version() -> u32 {
    MIN_SUPPORTED_VERSION
}
