//! Battery health estimation for cycle-tested battery fleets.
//!
//! This crate turns a metadata table of cycle tests into per-battery
//! capacity histories and derives state-of-health and remaining useful life
//! from a least-squares trend over those histories.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_health::{EstimatorConfig, Fleet, HealthEstimator};
//!
//! let fleet = Fleet::load("metadata.csv")?;
//! let estimator = HealthEstimator::new(EstimatorConfig::default());
//! let history = fleet.history("B0005")?;
//! let estimate = estimator.estimate(history)?;
//! println!("SoH: {:.1}%", estimate.state_of_health_pct);
//! ```

mod estimator;
mod ingest;
mod record;
mod regression;
mod sensor;

pub use estimator::{
    AlertLevel, EstimationError, EstimatorConfig, FitWindow, ForecastLine, HealthEstimate,
    HealthEstimator, RemainingLife, DEFAULT_ALERT_THRESHOLD_CYCLES, DEFAULT_EOL_THRESHOLD,
};
pub use ingest::{build_histories, Fleet, LoadError, MetadataRow, DISCHARGE_TYPE};
pub use record::{BatteryHistory, CycleRecord, TestId};
pub use regression::LinearFit;
pub use sensor::{ChannelSummary, ColumnMapping, SensorChannel, SensorError, SensorLog};
