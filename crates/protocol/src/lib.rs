mod request;
mod response;
mod types;
mod version;

pub use request::{DaemonRequest, EstimatorParams};
pub use response::DaemonResponse;
pub use types::{
    AlertLevel, BatterySummary, ChannelStats, CyclePoint, DaemonStatus, FleetReport,
    ForecastSnapshot, HealthSnapshot, LogEntry, SensorLogSnapshot, SkippedBattery, TrendSnapshot,
};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
