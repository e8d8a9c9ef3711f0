use serde::{Deserialize, Serialize};

use crate::types::{
    BatterySummary, DaemonStatus, FleetReport, HealthSnapshot, LogEntry, SensorLogSnapshot,
    TrendSnapshot,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonResponse {
    Status(DaemonStatus),
    Batteries(Vec<BatterySummary>),
    Health(HealthSnapshot),
    Trend(TrendSnapshot),
    FleetReport(FleetReport),
    Logs(Vec<LogEntry>),
    SensorLog(SensorLogSnapshot),
    /// A referenced detail file is absent. Recoverable for the caller.
    DataNotFound(String),
    Ok,
    Error(String),
}

impl DaemonResponse {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
