use color_eyre::eyre::Result;

use crate::commands::truncate_str;
use crate::data::HealthSource;

pub fn run(source: &mut dyn HealthSource, json: bool) -> Result<()> {
    let report = source.fleet_report()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Fleet Health (EOL {:.2} Ah, alert below {} cycles, fit {})",
        report.eol_threshold_ah, report.alert_threshold_cycles, report.fit_window
    );
    println!("{}", "=".repeat(72));
    println!(
        "{:<12} {:>7} {:>9} {:>14} {:>14} {:>10}",
        "Battery", "Cycles", "SoH %", "Capacity (Ah)", "RUL", "Alert"
    );
    println!("{}", "-".repeat(72));

    for b in &report.batteries {
        println!(
            "{:<12} {:>7} {:>9.1} {:>14.3} {:>14} {:>10}",
            truncate_str(&b.battery_id, 12),
            b.current_cycle,
            b.state_of_health_pct,
            b.latest_capacity_ah,
            b.remaining_display(),
            b.alert.label()
        );
    }

    if !report.skipped.is_empty() {
        println!();
        for skipped in &report.skipped {
            eprintln!("Warning: skipped {}: {}", skipped.battery_id, skipped.reason);
        }
    }

    println!();
    println!(
        "{} batteries, {} urgent",
        report.batteries.len(),
        report.urgent_count()
    );

    Ok(())
}
