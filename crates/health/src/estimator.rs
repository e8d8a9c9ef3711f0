//! State-of-health and remaining-useful-life estimation.
//!
//! Capacity is fitted linearly against cycle number, by default over the
//! whole history. The fitted line is solved for the end-of-life threshold to
//! predict the cycle at which the battery fails, and the distance from the
//! current cycle to that point is the remaining useful life.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{BatteryHistory, CycleRecord};
use crate::regression::LinearFit;

/// Capacity (Ah) below which a battery is due for replacement.
pub const DEFAULT_EOL_THRESHOLD: f64 = 1.4;
/// Remaining cycles below which a battery is flagged urgent.
pub const DEFAULT_ALERT_THRESHOLD_CYCLES: u64 = 15;

/// Slopes at or above `-SLOPE_EPSILON` are treated as non-degrading.
const SLOPE_EPSILON: f64 = 1e-12;
const FORECAST_MARGIN_CYCLES: f64 = 20.0;
/// A line needs two points; smaller windows would never fit.
const MIN_FIT_POINTS: usize = 2;

/// Which records feed the trend fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FitWindow {
    /// Entire history.
    #[default]
    All,
    /// Only the last N records.
    Recent(usize),
}

impl FromStr for FitWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(FitWindow::All);
        }

        let count = s.strip_prefix("recent:").unwrap_or(&s);
        match count.parse::<usize>() {
            Ok(n) if n < MIN_FIT_POINTS => Err(format!(
                "fit window must cover at least {} cycles, got {}",
                MIN_FIT_POINTS, n
            )),
            Ok(n) => Ok(FitWindow::Recent(n)),
            Err(_) => Err(format!(
                "invalid fit window '{}' (expected 'all' or 'recent:N')",
                s
            )),
        }
    }
}

impl FitWindow {
    /// The trailing records this window feeds to the fit.
    pub fn select<'a>(&self, records: &'a [CycleRecord]) -> &'a [CycleRecord] {
        match self {
            FitWindow::All => records,
            FitWindow::Recent(n) => &records[records.len().saturating_sub(*n)..],
        }
    }
}

impl fmt::Display for FitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWindow::All => f.write_str("all"),
            FitWindow::Recent(n) => write!(f, "recent:{}", n),
        }
    }
}

impl TryFrom<String> for FitWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FitWindow> for String {
    fn from(value: FitWindow) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub eol_threshold: f64,
    pub alert_threshold_cycles: u64,
    pub fit_window: FitWindow,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            eol_threshold: DEFAULT_EOL_THRESHOLD,
            alert_threshold_cycles: DEFAULT_ALERT_THRESHOLD_CYCLES,
            fit_window: FitWindow::All,
        }
    }
}

/// Predicted cycles left before capacity crosses the end-of-life threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingLife {
    Cycles(u64),
    /// The trend is flat, rising, or could not be fitted.
    Unbounded,
}

impl RemainingLife {
    pub fn cycles(&self) -> Option<u64> {
        match self {
            RemainingLife::Cycles(n) => Some(*n),
            RemainingLife::Unbounded => None,
        }
    }
}

impl fmt::Display for RemainingLife {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemainingLife::Cycles(n) => write!(f, "{} cycles", n),
            RemainingLife::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Healthy,
    Urgent,
}

impl AlertLevel {
    /// Pure threshold on the remaining life. No hysteresis.
    pub fn classify(remaining: RemainingLife, alert_threshold_cycles: u64) -> Self {
        match remaining {
            RemainingLife::Cycles(n) if n < alert_threshold_cycles => AlertLevel::Urgent,
            _ => AlertLevel::Healthy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertLevel::Healthy => "HEALTHY",
            AlertLevel::Urgent => "URGENT",
        }
    }
}

/// Two points on the fitted line, for drawing the forecast trend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastLine {
    pub start: (f64, f64),
    pub end: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthEstimate {
    pub battery_id: String,
    pub state_of_health_pct: f64,
    pub baseline_capacity: f64,
    pub latest_capacity: f64,
    pub current_cycle: u32,
    pub ambient_temperature: Option<f64>,
    pub remaining: RemainingLife,
    pub trend: Option<LinearFit>,
    pub predicted_end_cycle: Option<f64>,
    pub forecast: Option<ForecastLine>,
    pub alert: AlertLevel,
}

impl HealthEstimate {
    /// SoH change relative to a fresh battery, in percentage points.
    pub fn soh_delta(&self) -> f64 {
        self.state_of_health_pct - 100.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EstimationError {
    #[error("battery {battery_id} has no cycle records")]
    EmptyHistory { battery_id: String },

    #[error("battery {battery_id} has a zero baseline capacity")]
    ZeroBaseline { battery_id: String },

    #[error("battery {battery_id} has a non-finite baseline capacity ({capacity})")]
    InvalidBaseline { battery_id: String, capacity: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct HealthEstimator {
    config: EstimatorConfig,
}

impl HealthEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimate(&self, history: &BatteryHistory) -> Result<HealthEstimate, EstimationError> {
        self.estimate_records(history.battery_id(), history.records())
    }

    /// Estimates from an ordered slice of records.
    ///
    /// The first record is the baseline and the last is the current cycle.
    pub fn estimate_records(
        &self,
        battery_id: &str,
        records: &[CycleRecord],
    ) -> Result<HealthEstimate, EstimationError> {
        let (Some(baseline), Some(latest)) = (records.first(), records.last()) else {
            return Err(EstimationError::EmptyHistory {
                battery_id: battery_id.to_string(),
            });
        };

        if baseline.capacity == 0.0 {
            return Err(EstimationError::ZeroBaseline {
                battery_id: battery_id.to_string(),
            });
        }
        if !baseline.capacity.is_finite() {
            return Err(EstimationError::InvalidBaseline {
                battery_id: battery_id.to_string(),
                capacity: baseline.capacity,
            });
        }

        let state_of_health_pct = (latest.capacity / baseline.capacity) * 100.0;

        let points: Vec<(f64, f64)> = self
            .config
            .fit_window
            .select(records)
            .iter()
            .map(|r| (r.cycle as f64, r.capacity))
            .collect();
        let trend = LinearFit::fit(&points);

        let (predicted_end_cycle, remaining) = match &trend {
            Some(fit) => self.remaining_life(fit, latest.cycle),
            None => (None, RemainingLife::Unbounded),
        };
        let alert = AlertLevel::classify(remaining, self.config.alert_threshold_cycles);
        let forecast = trend.map(|fit| forecast_line(&fit, predicted_end_cycle, latest.cycle));

        Ok(HealthEstimate {
            battery_id: battery_id.to_string(),
            state_of_health_pct,
            baseline_capacity: baseline.capacity,
            latest_capacity: latest.capacity,
            current_cycle: latest.cycle,
            ambient_temperature: latest.ambient_temperature,
            remaining,
            trend,
            predicted_end_cycle,
            forecast,
            alert,
        })
    }

    fn remaining_life(&self, fit: &LinearFit, current_cycle: u32) -> (Option<f64>, RemainingLife) {
        if fit.slope >= -SLOPE_EPSILON {
            return (None, RemainingLife::Unbounded);
        }

        let end_cycle = fit.solve_for(self.config.eol_threshold);
        if !end_cycle.is_finite() {
            return (None, RemainingLife::Unbounded);
        }

        let remaining = (end_cycle - current_cycle as f64).max(0.0).trunc() as u64;
        (Some(end_cycle), RemainingLife::Cycles(remaining))
    }
}

fn forecast_line(fit: &LinearFit, predicted_end_cycle: Option<f64>, current_cycle: u32) -> ForecastLine {
    let end_x = predicted_end_cycle.unwrap_or(current_cycle as f64) + FORECAST_MARGIN_CYCLES;
    ForecastLine {
        start: (1.0, fit.predict(1.0)),
        end: (end_x, fit.predict(end_x)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(capacities: &[f64]) -> BatteryHistory {
        BatteryHistory::from_capacities("B0005", capacities).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_linear_decline_scenario() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[2.0, 1.8, 1.6])).unwrap();

        let trend = estimate.trend.unwrap();
        assert_close(trend.slope, -0.2);
        assert_close(trend.intercept, 2.2);
        assert_close(estimate.predicted_end_cycle.unwrap(), 4.0);
        assert_eq!(estimate.current_cycle, 3);
        assert_eq!(estimate.remaining, RemainingLife::Cycles(1));
        assert_eq!(estimate.alert, AlertLevel::Urgent);
        assert_close(estimate.state_of_health_pct, 80.0);
    }

    #[test]
    fn test_flat_history_unbounded() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[2.0, 2.0, 2.0])).unwrap();

        assert_eq!(estimate.trend.unwrap().slope, 0.0);
        assert_eq!(estimate.remaining, RemainingLife::Unbounded);
        assert_eq!(estimate.predicted_end_cycle, None);
        assert_eq!(estimate.alert, AlertLevel::Healthy);
        assert_eq!(estimate.state_of_health_pct, 100.0);
    }

    #[test]
    fn test_rising_capacity_unbounded() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[1.8, 1.9, 2.0])).unwrap();
        assert_eq!(estimate.remaining, RemainingLife::Unbounded);
    }

    #[test]
    fn test_single_record() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[1.85])).unwrap();

        assert_eq!(estimate.state_of_health_pct, 100.0);
        assert_eq!(estimate.trend, None);
        assert_eq!(estimate.forecast, None);
        assert_eq!(estimate.remaining, RemainingLife::Unbounded);
        assert_eq!(estimate.alert, AlertLevel::Healthy);
    }

    #[test]
    fn test_already_past_threshold_clamps_to_zero() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[2.0, 1.6, 1.2])).unwrap();
        assert_eq!(estimate.remaining, RemainingLife::Cycles(0));
        assert_eq!(estimate.alert, AlertLevel::Urgent);
    }

    #[test]
    fn test_remaining_truncates() {
        let estimator = HealthEstimator::default();

        // y = 2.1 - 0.2x reaches 1.4 at x = 3.5, current cycle 3: 0.5 truncates to 0
        let estimate = estimator
            .estimate(&history(&[1.9, 1.7, 1.5]))
            .unwrap();
        assert_close(estimate.predicted_end_cycle.unwrap(), 3.5);
        assert_eq!(estimate.remaining, RemainingLife::Cycles(0));

        // y = 2.2 - 0.12x reaches 1.4 at x = 6.67, current cycle 2: 4.67 truncates to 4
        let estimate = estimator.estimate(&history(&[2.08, 1.96])).unwrap();
        assert_close(estimate.predicted_end_cycle.unwrap(), 0.8 / 0.12);
        assert_eq!(estimate.remaining, RemainingLife::Cycles(4));
        assert_eq!(estimate.alert, AlertLevel::Urgent);
    }

    #[test]
    fn test_whole_number_crossing_follows_float_result() {
        // The exact crossing is cycle 31, but the fitted end cycle lands at
        // 30.999999999999957, so 25 cycles remain rather than 26.
        let estimator = HealthEstimator::default();
        let estimate = estimator
            .estimate(&history(&[2.0, 1.98, 1.96, 1.94, 1.92]))
            .unwrap();
        assert!(estimate.predicted_end_cycle.unwrap() < 31.0);
        assert_eq!(estimate.remaining, RemainingLife::Cycles(25));
    }

    #[test]
    fn test_soh_exactly_100_when_unchanged() {
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(&history(&[1.9, 1.7, 1.9])).unwrap();
        assert_eq!(estimate.state_of_health_pct, 100.0);
        assert_eq!(estimate.soh_delta(), 0.0);
    }

    #[test]
    fn test_idempotent() {
        let estimator = HealthEstimator::default();
        let h = history(&[2.0, 1.95, 1.91, 1.84, 1.80]);
        assert_eq!(estimator.estimate(&h).unwrap(), estimator.estimate(&h).unwrap());
    }

    #[test]
    fn test_zero_baseline() {
        let estimator = HealthEstimator::default();
        let err = estimator.estimate(&history(&[0.0, 1.0])).unwrap_err();
        assert_eq!(
            err,
            EstimationError::ZeroBaseline {
                battery_id: "B0005".to_string()
            }
        );
    }

    #[test]
    fn test_empty_records() {
        let estimator = HealthEstimator::default();
        let err = estimator.estimate_records("B0018", &[]).unwrap_err();
        assert!(matches!(err, EstimationError::EmptyHistory { .. }));
    }

    #[test]
    fn test_alert_boundary() {
        assert_eq!(
            AlertLevel::classify(RemainingLife::Cycles(15), 15),
            AlertLevel::Healthy
        );
        assert_eq!(
            AlertLevel::classify(RemainingLife::Cycles(14), 15),
            AlertLevel::Urgent
        );
        assert_eq!(
            AlertLevel::classify(RemainingLife::Unbounded, 15),
            AlertLevel::Healthy
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let estimator = HealthEstimator::new(EstimatorConfig {
            eol_threshold: 1.0,
            alert_threshold_cycles: 2,
            fit_window: FitWindow::All,
        });
        // y = 2.2 - 0.2x reaches 1.0 at x = 6, current cycle 3
        let estimate = estimator.estimate(&history(&[2.0, 1.8, 1.6])).unwrap();
        assert_close(estimate.predicted_end_cycle.unwrap(), 6.0);
        assert_eq!(estimate.remaining, RemainingLife::Cycles(3));
        assert_eq!(estimate.alert, AlertLevel::Healthy);

        let urgent = HealthEstimator::new(EstimatorConfig {
            alert_threshold_cycles: 4,
            ..*estimator.config()
        })
        .estimate(&history(&[2.0, 1.8, 1.6]))
        .unwrap();
        assert_eq!(urgent.alert, AlertLevel::Urgent);
    }

    #[test]
    fn test_recent_window_tracks_acceleration() {
        let capacities = [2.0, 1.99, 1.98, 1.97, 1.96, 1.86, 1.76, 1.66];

        let full = HealthEstimator::default()
            .estimate(&history(&capacities))
            .unwrap();
        let recent = HealthEstimator::new(EstimatorConfig {
            fit_window: FitWindow::Recent(3),
            ..EstimatorConfig::default()
        })
        .estimate(&history(&capacities))
        .unwrap();

        assert_eq!(recent.trend.unwrap().samples, 3);
        assert_close(recent.trend.unwrap().slope, -0.1);
        assert!(recent.remaining.cycles().unwrap() < full.remaining.cycles().unwrap());
        // SoH still compares against the first cycle
        assert_close(recent.state_of_health_pct, 83.0);
    }

    #[test]
    fn test_window_select() {
        let h = history(&[2.0, 1.9, 1.8, 1.7]);
        assert_eq!(FitWindow::All.select(h.records()).len(), 4);
        let recent = FitWindow::Recent(2).select(h.records());
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].cycle, 3);
        assert_eq!(FitWindow::Recent(10).select(h.records()).len(), 4);
    }

    #[test]
    fn test_narrow_window_still_flags_failing_battery() {
        // latest capacity is already under 1.4 Ah
        let estimate = HealthEstimator::new(EstimatorConfig {
            fit_window: "recent:2".parse().unwrap(),
            ..EstimatorConfig::default()
        })
        .estimate(&history(&[2.0, 1.5, 1.0]))
        .unwrap();
        assert_eq!(estimate.remaining, RemainingLife::Cycles(0));
        assert_eq!(estimate.alert, AlertLevel::Urgent);
    }

    #[test]
    fn test_forecast_extends_past_end_of_life() {
        let estimate = HealthEstimator::default()
            .estimate(&history(&[2.0, 1.8, 1.6]))
            .unwrap();
        let forecast = estimate.forecast.unwrap();
        assert_close(forecast.start.0, 1.0);
        assert_close(forecast.start.1, 2.0);
        assert_close(forecast.end.0, 24.0);
        assert_close(forecast.end.1, 2.2 - 0.2 * 24.0);
    }

    #[test]
    fn test_fit_window_parse() {
        assert_eq!("all".parse::<FitWindow>().unwrap(), FitWindow::All);
        assert_eq!("ALL".parse::<FitWindow>().unwrap(), FitWindow::All);
        assert_eq!(
            "recent:20".parse::<FitWindow>().unwrap(),
            FitWindow::Recent(20)
        );
        assert_eq!("30".parse::<FitWindow>().unwrap(), FitWindow::Recent(30));
        assert!("recent:0".parse::<FitWindow>().is_err());
        assert!("recent:1".parse::<FitWindow>().is_err());
        assert!("1".parse::<FitWindow>().is_err());
        assert_eq!("recent:2".parse::<FitWindow>().unwrap(), FitWindow::Recent(2));
        assert!("last week".parse::<FitWindow>().is_err());
        assert_eq!(FitWindow::Recent(5).to_string(), "recent:5");
    }
}
