use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DaemonCommands {
    /// Load the dataset and start serving queries
    Start {
        /// Stay attached to the terminal and log to stderr too
        #[arg(short, long)]
        foreground: bool,
    },

    /// Ask a running daemon to shut down
    Stop,

    /// Show whether the daemon is running and what it has loaded
    Status,

    /// Print the daemon log
    Log {
        /// Number of lines to show
        #[arg(short, long, default_value_t = 50)]
        lines: usize,

        /// Keep following the log
        #[arg(short, long)]
        follow: bool,
    },
}
