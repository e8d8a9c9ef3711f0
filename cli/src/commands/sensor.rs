use color_eyre::eyre::Result;
use sentinel_protocol::{ChannelStats, SensorLogSnapshot};

use crate::data::HealthSource;

pub fn run(
    source: &mut dyn HealthSource,
    filename: &str,
    rows: Option<usize>,
    json: bool,
) -> Result<()> {
    let log = match source.sensor_log(filename) {
        Ok(log) => log,
        Err(e) if e.is_data_not_found() => {
            eprintln!(
                "Warning: file {} not found in the data directory. Ensure all archive CSVs are moved there.",
                filename
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        print_sensor_log(&log);
        if let Some(limit) = rows {
            println!();
            print!("{}", raw_table(&log, limit));
        }
    }
    Ok(())
}

pub fn print_sensor_log(log: &SensorLogSnapshot) {
    println!("Sensor Log: {} ({} rows)", log.filename, log.row_count);
    println!("{}", "=".repeat(72));
    println!(
        "{:<12} {:<22} {:>8} {:>8} {:>8} {:>8}",
        "Channel", "Column", "Min", "Max", "Mean", "Last"
    );
    println!("{}", "-".repeat(72));

    print_channel("Voltage", log.voltage.as_ref());
    print_channel("Temperature", log.temperature.as_ref());
    print_channel("Current", log.current.as_ref());

    println!("\nColumns: {}", log.columns.join(", "));
}

fn print_channel(label: &str, stats: Option<&ChannelStats>) {
    match stats {
        Some(s) => println!(
            "{:<12} {:<22} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {}",
            label, s.column, s.min, s.max, s.mean, s.last, s.unit
        ),
        None => println!("{:<12} {:<22}", label, "-"),
    }
}

/// The first `limit` rows as aligned columns under the file's own headers.
fn raw_table(log: &SensorLogSnapshot, limit: usize) -> String {
    let shown = &log.rows[..limit.min(log.rows.len())];
    let widths: Vec<usize> = log
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            shown
                .iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                format!("{:>width$}", cell, width = w)
            })
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(&log.columns);
    let rule = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    out.push_str(&"-".repeat(rule));
    out.push('\n');
    for row in shown {
        out.push_str(&line(row));
    }
    if shown.len() < log.rows.len() {
        out.push_str(&format!("... {} more rows\n", log.rows.len() - shown.len()));
    }
    out
}
