//! Conversions from estimator results into protocol snapshots.

use sentinel_health::{
    AlertLevel, BatteryHistory, ChannelSummary, EstimatorConfig, Fleet, HealthEstimate,
    HealthEstimator, MetadataRow, SensorChannel, SensorLog,
};
use sentinel_protocol::{
    AlertLevel as ProtocolAlertLevel, BatterySummary, ChannelStats, CyclePoint, FleetReport,
    ForecastSnapshot, HealthSnapshot, LogEntry, SensorLogSnapshot, SkippedBattery, TrendSnapshot,
};
use tracing::warn;

pub fn health_snapshot(estimate: &HealthEstimate, config: &EstimatorConfig) -> HealthSnapshot {
    let alert = match estimate.alert {
        AlertLevel::Healthy => ProtocolAlertLevel::Healthy,
        AlertLevel::Urgent => ProtocolAlertLevel::Urgent,
    };

    HealthSnapshot {
        battery_id: estimate.battery_id.clone(),
        state_of_health_pct: estimate.state_of_health_pct,
        baseline_capacity_ah: estimate.baseline_capacity,
        latest_capacity_ah: estimate.latest_capacity,
        current_cycle: estimate.current_cycle,
        remaining_cycles: estimate.remaining.cycles(),
        predicted_end_cycle: estimate.predicted_end_cycle,
        trend_slope: estimate.trend.map(|t| t.slope),
        trend_intercept: estimate.trend.map(|t| t.intercept),
        ambient_temperature_c: estimate.ambient_temperature,
        alert,
        eol_threshold_ah: config.eol_threshold,
        alert_threshold_cycles: config.alert_threshold_cycles,
    }
}

pub fn trend_snapshot(
    history: &BatteryHistory,
    estimate: &HealthEstimate,
    config: &EstimatorConfig,
) -> TrendSnapshot {
    TrendSnapshot {
        battery_id: history.battery_id().to_string(),
        observed: history
            .records()
            .iter()
            .map(|r| CyclePoint {
                cycle: r.cycle,
                capacity_ah: r.capacity,
            })
            .collect(),
        forecast: estimate.forecast.map(|f| ForecastSnapshot {
            start_cycle: f.start.0,
            start_capacity_ah: f.start.1,
            end_cycle: f.end.0,
            end_capacity_ah: f.end.1,
        }),
        eol_threshold_ah: config.eol_threshold,
        fit_window: config.fit_window.to_string(),
    }
}

pub fn battery_summaries(fleet: &Fleet) -> Vec<BatterySummary> {
    fleet
        .histories()
        .map(|h| BatterySummary {
            battery_id: h.battery_id().to_string(),
            cycle_count: h.len(),
            latest_capacity_ah: h.latest().capacity,
        })
        .collect()
}

pub fn log_entry(row: &MetadataRow) -> LogEntry {
    LogEntry {
        test_id: row.test_id.clone(),
        test_type: row.test_type.clone(),
        filename: row.filename.clone(),
        capacity_ah: row.capacity(),
    }
}

fn channel_stats(log: &SensorLog, channel: SensorChannel) -> Option<ChannelStats> {
    let column = log.column(channel)?;
    let ChannelSummary {
        count,
        min,
        max,
        mean,
        first,
        last,
    } = log.summary(channel)?;

    Some(ChannelStats {
        column: column.to_string(),
        unit: channel.unit().to_string(),
        count,
        min,
        max,
        mean,
        first,
        last,
        values: log.values(channel).to_vec(),
    })
}

pub fn sensor_snapshot(log: &SensorLog) -> SensorLogSnapshot {
    SensorLogSnapshot {
        filename: log.filename().to_string(),
        row_count: log.row_count(),
        columns: log.headers().to_vec(),
        voltage: channel_stats(log, SensorChannel::Voltage),
        temperature: channel_stats(log, SensorChannel::Temperature),
        current: channel_stats(log, SensorChannel::Current),
        rows: log.rows().to_vec(),
    }
}

/// Estimates every battery. A failing battery is skipped, not fatal.
pub fn fleet_report(fleet: &Fleet, estimator: &HealthEstimator) -> FleetReport {
    let config = estimator.config();
    let mut report = FleetReport {
        eol_threshold_ah: config.eol_threshold,
        alert_threshold_cycles: config.alert_threshold_cycles,
        fit_window: config.fit_window.to_string(),
        ..FleetReport::default()
    };

    for history in fleet.histories() {
        match estimator.estimate(history) {
            Ok(estimate) => report.batteries.push(health_snapshot(&estimate, config)),
            Err(e) => {
                warn!(battery_id = history.battery_id(), error = %e, "Skipping battery");
                report.skipped.push(SkippedBattery {
                    battery_id: history.battery_id().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
battery_id,test_id,type,Capacity,filename,ambient_temperature
B0005,1,discharge,2.0,00001.csv,24
B0005,2,charge,,00002.csv,24
B0005,3,discharge,1.8,00003.csv,24
B0005,4,discharge,1.6,00004.csv,24
B0018,1,discharge,0,00005.csv,24
B0018,2,discharge,1.5,00006.csv,24
B0047,1,discharge,1.7,00007.csv,4
";

    fn fleet() -> Fleet {
        Fleet::from_reader(TABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_health_snapshot_fields() {
        let fleet = fleet();
        let estimator = HealthEstimator::default();
        let estimate = estimator.estimate(fleet.history("B0005").unwrap()).unwrap();
        let snapshot = health_snapshot(&estimate, estimator.config());

        assert_eq!(snapshot.battery_id, "B0005");
        assert_eq!(snapshot.current_cycle, 3);
        assert_eq!(snapshot.remaining_cycles, Some(1));
        assert_eq!(snapshot.alert, ProtocolAlertLevel::Urgent);
        assert_eq!(snapshot.ambient_temperature_c, Some(24.0));
        assert_eq!(snapshot.eol_threshold_ah, 1.4);
    }

    #[test]
    fn test_fleet_report_skips_zero_baseline() {
        let report = fleet_report(&fleet(), &HealthEstimator::default());

        let ids: Vec<&str> = report
            .batteries
            .iter()
            .map(|b| b.battery_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B0005", "B0047"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].battery_id, "B0018");
        assert_eq!(report.urgent_count(), 1);
    }

    #[test]
    fn test_trend_snapshot_observed_points() {
        let fleet = fleet();
        let estimator = HealthEstimator::default();
        let history = fleet.history("B0005").unwrap();
        let estimate = estimator.estimate(history).unwrap();
        let trend = trend_snapshot(history, &estimate, estimator.config());

        let cycles: Vec<u32> = trend.observed.iter().map(|p| p.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 3]);
        assert!(trend.forecast.is_some());
        assert_eq!(trend.fit_window, "all");
    }

    #[test]
    fn test_summaries_and_log_entries() {
        let fleet = fleet();
        let summaries = battery_summaries(&fleet);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].cycle_count, 3);

        let entries: Vec<LogEntry> = fleet.logs_for("B0005").into_iter().map(log_entry).collect();
        assert_eq!(entries[0].filename, "00004.csv");
        assert_eq!(entries[2].test_type, "charge");
        assert_eq!(entries[2].capacity_ah, None);
    }
}
