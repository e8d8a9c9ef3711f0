use std::os::unix::process::CommandExt;
use std::time::Duration;

use color_eyre::eyre::{eyre, Result};

use crate::cli::DaemonCommands;
use crate::config::{LogLevel, UserConfig};
use crate::daemon::{is_daemon_running, run_daemon, socket_path, DaemonClient, DaemonExit};
use crate::logging::{self, LogMode};

const STARTUP_ATTEMPTS: u32 = 10;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls `check` until it passes or the attempts run out.
fn wait_until(attempts: u32, interval: Duration, mut check: impl FnMut() -> bool) -> bool {
    for attempt in 0..attempts {
        if check() {
            return true;
        }
        if attempt + 1 < attempts {
            std::thread::sleep(interval);
        }
    }
    false
}

pub fn run(
    command: DaemonCommands,
    config: &UserConfig,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    let log_level = config.log_level;

    match command {
        DaemonCommands::Start { foreground } => {
            if is_daemon_running() {
                println!("Daemon is already running.");
                return Ok(());
            }

            if foreground {
                let _guard = logging::init(log_level, LogMode::Both, log_level_override);
                println!("Starting daemon in foreground...");
                println!("Press Ctrl+C to stop.");
                run_daemon(config, true, log_level, log_level_override)
                    .map_err(|e| eyre!("{}", e))?;
            } else {
                println!("Starting daemon...");
                let exit = run_daemon(config, false, log_level, log_level_override)
                    .map_err(|e| eyre!("{}", e))?;
                if exit == DaemonExit::Stopped {
                    return Ok(());
                }

                if wait_until(STARTUP_ATTEMPTS, STARTUP_POLL_INTERVAL, is_daemon_running) {
                    println!("Daemon started successfully.");
                    println!("Socket: {:?}", socket_path());
                } else {
                    println!("Daemon may have failed to start. Check logs:");
                    println!("  sentinel daemon log");
                }
            }
        }
        DaemonCommands::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }

            match DaemonClient::connect() {
                Ok(mut client) => {
                    client.shutdown().map_err(|e| eyre!("{}", e))?;
                    println!("Daemon stopped.");
                }
                Err(e) => {
                    eprintln!("Failed to connect to daemon: {}", e);
                    std::process::exit(1);
                }
            }
        }
        DaemonCommands::Status => {
            println!("Daemon Status");
            println!("{}", "-".repeat(40));

            if !is_daemon_running() {
                println!("Running:      no");
                return Ok(());
            }

            match DaemonClient::connect() {
                Ok(mut client) => {
                    let status = client.get_status().map_err(|e| eyre!("{}", e))?;
                    println!("Running:      yes");
                    println!("Version:      {}", status.version);
                    println!(
                        "Protocol:     v{} (accepts v{}+)",
                        status.protocol_version, status.min_supported_version
                    );
                    println!(
                        "Uptime:       {}",
                        humantime::format_duration(Duration::from_secs(status.uptime_secs))
                    );
                    println!("Metadata:     {}", status.metadata_path);
                    println!("Batteries:    {}", status.battery_count);
                    println!("Rows:         {}", status.row_count);
                    println!("Requests:     {}", status.requests_served);
                    if let Some(dt) = chrono::DateTime::from_timestamp(status.loaded_at, 0) {
                        println!("Loaded at:    {}", dt.format("%Y-%m-%d %H:%M:%S UTC"));
                    }
                }
                Err(e) => {
                    eprintln!("Failed to connect to daemon: {}", e);
                    std::process::exit(1);
                }
            }
        }
        DaemonCommands::Log { lines, follow } => {
            let log_dir = logging::log_dir();

            let Some(path) = logging::newest_daemon_log(&log_dir) else {
                println!("No log files found in {:?}", log_dir);
                println!("Log files are created when the daemon runs in the background.");
                return Ok(());
            };

            if follow {
                let err = std::process::Command::new("tail")
                    .args(["-f", "-n", &lines.to_string()])
                    .arg(path)
                    .exec();
                return Err(err.into());
            }

            std::process::Command::new("tail")
                .args(["-n", &lines.to_string()])
                .arg(path)
                .status()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_until_stops_on_success() {
        let mut calls = 0;
        let started = wait_until(5, Duration::ZERO, || {
            calls += 1;
            calls == 3
        });
        assert!(started);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_wait_until_gives_up() {
        let mut calls = 0;
        let started = wait_until(4, Duration::ZERO, || {
            calls += 1;
            false
        });
        assert!(!started);
        assert_eq!(calls, 4);
    }
}
