use serde::{Deserialize, Serialize};

/// Estimator settings the client wants applied to a query.
///
/// The daemon is stateless per request, so two clients with different
/// thresholds can share one daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    pub eol_threshold_ah: f64,
    pub alert_threshold_cycles: u64,
    /// `all` or `recent:N`.
    pub fit_window: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonRequest {
    GetStatus,
    ListBatteries,
    GetHealth {
        battery_id: String,
        params: EstimatorParams,
    },
    GetTrend {
        battery_id: String,
        params: EstimatorParams,
    },
    GetFleetReport {
        params: EstimatorParams,
    },
    ListLogs {
        battery_id: String,
    },
    GetSensorLog {
        filename: String,
    },
    Shutdown,
}

impl DaemonRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
