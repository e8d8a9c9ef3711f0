use color_eyre::eyre::Result;

use crate::commands::truncate_str;
use crate::data::HealthSource;

pub fn run(source: &mut dyn HealthSource, battery_id: &str) -> Result<()> {
    let logs = match source.logs(battery_id) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("No logs for {}: {}", battery_id, e);
            std::process::exit(1);
        }
    };

    println!("Test Logs: {} ({} files, newest first)", battery_id, logs.len());
    println!("{}", "=".repeat(56));
    println!(
        "{:<8} {:<12} {:<22} {:>12}",
        "Test", "Type", "File", "Capacity"
    );
    println!("{}", "-".repeat(56));

    for entry in &logs {
        let capacity = entry
            .capacity_ah
            .map(|c| format!("{:.3} Ah", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<12} {:<22} {:>12}",
            truncate_str(&entry.test_id, 8),
            truncate_str(&entry.test_type, 12),
            truncate_str(&entry.filename, 22),
            capacity
        );
    }

    println!("\nInspect one with: sentinel sensor <file>");
    Ok(())
}
