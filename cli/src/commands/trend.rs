use color_eyre::eyre::Result;
use sentinel_protocol::TrendSnapshot;

use crate::data::HealthSource;

pub fn run(source: &mut dyn HealthSource, battery_id: &str, json: bool) -> Result<()> {
    let trend = match source.trend(battery_id) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Cannot fit trend for {}: {}", battery_id, e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&trend)?);
        return Ok(());
    }

    print!("{}", render_table(&trend));
    Ok(())
}

fn render_table(trend: &TrendSnapshot) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Capacity Degradation: {} (fit {})\n",
        trend.battery_id, trend.fit_window
    ));
    out.push_str(&format!("{}\n", "=".repeat(44)));
    out.push_str(&format!(
        "{:>6} {:>14} {:>14} {:>6}\n",
        "Cycle", "Observed (Ah)", "Trend (Ah)", ""
    ));
    out.push_str(&format!("{}\n", "-".repeat(44)));

    for point in &trend.observed {
        let fitted = trend
            .forecast
            .map(|f| format!("{:.3}", f.value_at(point.cycle as f64)))
            .unwrap_or_else(|| "-".to_string());
        let marker = if point.capacity_ah < trend.eol_threshold_ah {
            "EOL"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:>6} {:>14.3} {:>14} {:>6}\n",
            point.cycle, point.capacity_ah, fitted, marker
        ));
    }

    out.push('\n');
    match trend.forecast {
        Some(f) => out.push_str(&format!(
            "Forecast: {:.3} Ah at cycle {:.0} to {:.3} Ah at cycle {:.1}\n",
            f.start_capacity_ah, f.start_cycle, f.end_capacity_ah, f.end_cycle
        )),
        None => out.push_str("Forecast: not enough cycles to fit\n"),
    }
    out.push_str(&format!(
        "Failure threshold: {:.2} Ah\n",
        trend.eol_threshold_ah
    ));

    out
}

#[cfg(test)]
mod tests {
    use sentinel_protocol::{CyclePoint, ForecastSnapshot};

    use super::*;

    #[test]
    fn test_table_rows_and_markers() {
        let trend = TrendSnapshot {
            battery_id: "B0005".to_string(),
            observed: vec![
                CyclePoint {
                    cycle: 1,
                    capacity_ah: 2.0,
                },
                CyclePoint {
                    cycle: 2,
                    capacity_ah: 1.3,
                },
            ],
            forecast: Some(ForecastSnapshot {
                start_cycle: 1.0,
                start_capacity_ah: 2.0,
                end_cycle: 3.0,
                end_capacity_ah: 0.6,
            }),
            eol_threshold_ah: 1.4,
            fit_window: "all".to_string(),
        };

        let table = render_table(&trend);
        assert!(table.contains("Capacity Degradation: B0005 (fit all)"));
        let row = table
            .lines()
            .find(|l| l.trim_start().starts_with("2 "))
            .unwrap();
        assert!(row.contains("1.300"));
        assert!(row.ends_with("EOL"));
        assert!(table.contains("Failure threshold: 1.40 Ah"));
    }

    #[test]
    fn test_table_without_forecast() {
        let trend = TrendSnapshot {
            battery_id: "B0047".to_string(),
            observed: vec![CyclePoint {
                cycle: 1,
                capacity_ah: 1.7,
            }],
            forecast: None,
            eol_threshold_ah: 1.4,
            fit_window: "all".to_string(),
        };

        assert!(render_table(&trend).contains("not enough cycles to fit"));
    }
}
