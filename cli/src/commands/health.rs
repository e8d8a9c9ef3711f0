use color_eyre::eyre::Result;
use sentinel_protocol::{AlertLevel, HealthSnapshot};

use crate::commands::sensor::print_sensor_log;
use crate::data::HealthSource;

pub fn run(
    source: &mut dyn HealthSource,
    battery_id: &str,
    show_log: bool,
    json: bool,
) -> Result<()> {
    let health = match source.health(battery_id) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Cannot estimate health for {}: {}", battery_id, e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        print_health(&health);
    }

    if show_log {
        print_latest_log(source, battery_id)?;
    }

    Ok(())
}

fn print_health(health: &HealthSnapshot) {
    println!("Asset Health: {}", health.battery_id);
    println!("{}", "=".repeat(50));
    println!(
        "State of Health:   {:.1}% ({:+.1}%)",
        health.state_of_health_pct,
        health.soh_delta()
    );
    println!("Current Capacity:  {:.3} Ah", health.latest_capacity_ah);
    println!("Remaining Life:    {}", health.remaining_display());
    match health.ambient_temperature_c {
        Some(t) => println!("Ambient Temp:      {}°C", t),
        None => println!("Ambient Temp:      n/a"),
    }
    println!("Current Cycle:     {}", health.current_cycle);

    match (health.trend_slope, health.predicted_end_cycle) {
        (Some(slope), Some(end)) if end.is_finite() => {
            println!(
                "Trend:             {:+.4} Ah/cycle, crosses {:.2} Ah at cycle {:.1}",
                slope, health.eol_threshold_ah, end
            );
        }
        (Some(slope), _) => {
            println!("Trend:             {:+.4} Ah/cycle", slope);
        }
        (None, _) => println!("Trend:             not enough cycles to fit"),
    }

    println!();
    println!("{}", alert_message(health));
}

pub fn alert_message(health: &HealthSnapshot) -> String {
    match (health.alert, health.remaining_cycles) {
        (AlertLevel::Urgent, Some(n)) => format!(
            "URGENT: Site {} battery is nearing End-of-Life. Replacement recommended within {} cycles.",
            health.battery_id, n
        ),
        (_, Some(n)) => format!(
            "Site {} is healthy. Estimated maintenance needed in {} cycles.",
            health.battery_id, n
        ),
        (_, None) => format!(
            "Site {} is healthy. The capacity trend does not reach end-of-life.",
            health.battery_id
        ),
    }
}

/// The newest test log of any type, matching the default selection of `logs`.
fn print_latest_log(source: &mut dyn HealthSource, battery_id: &str) -> Result<()> {
    let logs = source.logs(battery_id)?;
    let Some(latest) = logs.first() else {
        return Ok(());
    };

    println!();
    match source.sensor_log(&latest.filename) {
        Ok(log) => print_sensor_log(&log),
        Err(e) if e.is_data_not_found() => {
            tracing::warn!(filename = %latest.filename, "Sensor log missing");
            eprintln!(
                "Warning: file {} not found in the data directory. Ensure all archive CSVs are moved there.",
                latest.filename
            );
        }
        Err(e) => eprintln!("Warning: cannot read {}: {}", latest.filename, e),
    }

    Ok(())
}
