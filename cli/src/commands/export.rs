use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result};
use sentinel_protocol::{FleetReport, HealthSnapshot};
use serde::Serialize;

use crate::cli::ExportFormat;
use crate::data::HealthSource;

pub fn run(
    source: &mut dyn HealthSource,
    output: Option<PathBuf>,
    format: ExportFormat,
    compact: bool,
) -> Result<()> {
    let report = source.fleet_report()?;

    for skipped in &report.skipped {
        eprintln!("Warning: skipped {}: {}", skipped.battery_id, skipped.reason);
    }

    let content = match format {
        ExportFormat::Csv => export_to_csv(&report)?,
        ExportFormat::Json => export_to_json(&report, compact)?,
    };

    if let Some(path) = output {
        std::fs::write(&path, &content)?;
        println!(
            "Exported {} batteries to: {}",
            report.batteries.len(),
            path.display()
        );
    } else {
        println!("{}", content);
    }

    Ok(())
}

fn export_to_json(report: &FleetReport, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(report)
    } else {
        serde_json::to_string_pretty(report)
    }
}

/// One CSV line per battery. Numbers are pre-formatted to a fixed precision.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    battery_id: &'a str,
    current_cycle: u32,
    soh_pct: String,
    baseline_ah: String,
    capacity_ah: String,
    remaining_cycles: Option<u64>,
    predicted_end_cycle: Option<String>,
    slope: Option<String>,
    intercept: Option<String>,
    ambient_c: Option<String>,
    alert: &'static str,
}

impl<'a> CsvRow<'a> {
    fn from_snapshot(b: &'a HealthSnapshot) -> Self {
        Self {
            battery_id: &b.battery_id,
            current_cycle: b.current_cycle,
            soh_pct: format!("{:.2}", b.state_of_health_pct),
            baseline_ah: format!("{:.4}", b.baseline_capacity_ah),
            capacity_ah: format!("{:.4}", b.latest_capacity_ah),
            remaining_cycles: b.remaining_cycles,
            predicted_end_cycle: b.predicted_end_cycle.map(|c| format!("{:.2}", c)),
            slope: b.trend_slope.map(|s| format!("{:.6}", s)),
            intercept: b.trend_intercept.map(|i| format!("{:.6}", i)),
            ambient_c: b.ambient_temperature_c.map(|t| t.to_string()),
            alert: b.alert.label(),
        }
    }
}

fn export_to_csv(report: &FleetReport) -> Result<String> {
    let header = format!(
        "# Sentinel Fleet Export: generated {} (eol {:.2} Ah, alert < {} cycles, fit {})\n",
        chrono::DateTime::from_timestamp(report.generated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| report.generated_at.to_string()),
        report.eol_threshold_ah,
        report.alert_threshold_cycles,
        report.fit_window
    )
    .into_bytes();

    let mut writer = csv::Writer::from_writer(header);
    for b in &report.batteries {
        writer.serialize(CsvRow::from_snapshot(b))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| eyre!("failed to flush CSV export: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
