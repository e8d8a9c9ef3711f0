mod daemon;

pub use daemon::DaemonCommands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sentinel_health::FitWindow;

use crate::config::ConfigOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Health overview of every battery
    #[command(alias = "ls")]
    Fleet {
        /// Print the report as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// State of health, remaining life and alert for one battery
    Health {
        battery_id: String,

        /// Also summarize the newest test log, whatever its type
        #[arg(short, long)]
        log: bool,

        /// Print the estimate as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Capacity per cycle with the fitted trend
    Trend {
        battery_id: String,

        /// Print the trend as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Every test log recorded for a battery, newest first
    Logs { battery_id: String },

    /// Summarize the voltage, temperature and current of one detail file
    Sensor {
        filename: String,

        /// Also print the first N raw rows
        #[arg(short, long, value_name = "N")]
        rows: Option<usize>,

        /// Print the summary, series and rows as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Export the fleet report
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Single-line JSON
        #[arg(short, long)]
        compact: bool,
    },

    /// Show or edit configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },

    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

/// Battery fleet health: state of health, remaining useful life and alerts
/// from cycle-test capacity data.
#[derive(Debug, Parser)]
#[command(name = "sentinel", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Query a running daemon instead of loading the dataset
    #[arg(short, long, global = true)]
    pub daemon: bool,

    /// Metadata table to load
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Directory holding the per-cycle sensor logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// End-of-life capacity threshold in Ah
    #[arg(long, global = true)]
    pub eol_threshold: Option<f64>,

    /// Remaining cycles below which a battery is urgent
    #[arg(long, global = true)]
    pub alert_threshold: Option<u64>,

    /// Cycles used for the trend fit: "all" or "recent:N" (N >= 2)
    #[arg(long, global = true)]
    pub window: Option<FitWindow>,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            metadata_path: self.metadata.clone(),
            data_dir: self.data_dir.clone(),
            eol_threshold: self.eol_threshold,
            alert_threshold_cycles: self.alert_threshold,
            fit_window: self.window,
        }
    }
}
