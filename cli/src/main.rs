mod cli;
mod commands;
mod config;
mod daemon;
mod data;
mod logging;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use sentinel_health::LoadError;

use cli::{Cli, Commands};
use config::{ensure_dirs, LogLevel, UserConfig};
use daemon::DaemonClient;
use data::{dataset, HealthSource, LocalSource, RemoteSource};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let mut config = UserConfig::load();
    config.merge_with_args(&cli.overrides());
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);
    let use_daemon = cli.daemon;

    // `config` stays usable so a broken file can be inspected and reset.
    if !matches!(cli.command, Commands::Config { .. }) {
        if let Err(e) = config.validate() {
            eprintln!("Invalid configuration: {}", e);
            eprintln!(
                "Fix {} or the command-line overrides.",
                config::config_path().display()
            );
            std::process::exit(1);
        }
    }

    match cli.command {
        Commands::Config { path, reset, edit } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(&config, path, reset, edit)
        }
        Commands::Daemon { command } => commands::daemon::run(command, &config, log_level_override),
        Commands::Fleet { json } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::fleet::run(open_source(&config, use_daemon)?.as_mut(), json)
        }
        Commands::Health {
            battery_id,
            log,
            json,
        } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::health::run(
                open_source(&config, use_daemon)?.as_mut(),
                &battery_id,
                log,
                json,
            )
        }
        Commands::Trend { battery_id, json } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::trend::run(open_source(&config, use_daemon)?.as_mut(), &battery_id, json)
        }
        Commands::Logs { battery_id } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::logs::run(open_source(&config, use_daemon)?.as_mut(), &battery_id)
        }
        Commands::Sensor {
            filename,
            rows,
            json,
        } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::sensor::run(
                open_source(&config, use_daemon)?.as_mut(),
                &filename,
                rows,
                json,
            )
        }
        Commands::Export {
            output,
            format,
            compact,
        } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::export::run(
                open_source(&config, use_daemon)?.as_mut(),
                output,
                format,
                compact,
            )
        }
    }
}

/// Connects to the daemon when asked to, otherwise loads the dataset locally.
///
/// A missing metadata table ends the session here.
fn open_source(config: &UserConfig, use_daemon: bool) -> Result<Box<dyn HealthSource>> {
    if use_daemon {
        let client = DaemonClient::connect_with_version_check().map_err(|e| {
            eyre!(
                "Cannot reach the daemon ({}). Start it with: sentinel daemon start",
                e
            )
        })?;
        return Ok(Box::new(RemoteSource::new(client, config.estimator_params())));
    }

    match dataset::init(config) {
        Ok(fleet) => Ok(Box::new(LocalSource::new(fleet, config))),
        Err(LoadError::Configuration { path }) => {
            eprintln!("Missing '{}' in the project folder!", path.display());
            eprintln!("Pass --metadata or set metadata_path in the config file.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
