use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wellguard", version, about = "Wellguard app-usage limiter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the monitored apps and their daily limits
    Configure {
        /// App limit as PKG=LIMIT[:USAGE][:blocked], e.g. com.video=30m:5m
        #[arg(long = "app", value_name = "SPEC", value_parser = commands::parse_app)]
        apps: Vec<wellguard_core::LimitEntry>,
        /// JSON file holding an array of limit entries
        #[arg(long, conflicts_with = "apps")]
        file: Option<PathBuf>,
    },
    /// Lift the block on an app
    Unblock {
        /// Package id
        package: String,
    },
    /// List blocked apps
    Blocked {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show usage against limits
    Usage {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the monitor status as JSON
    Status,
    /// Run the monitor until interrupted
    Run {
        /// Read foreground changes from stdin as `PKG [TIMESTAMP_MS]` lines
        /// and stop at end of input
        #[arg(long)]
        stdin: bool,
    },
    /// Replay a foreground script on a virtual clock
    Replay {
        /// Script file
        file: PathBuf,
        /// Keep ticking until this many seconds into the script
        #[arg(long, value_name = "SECS")]
        until: Option<u64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("WELLGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Configure { apps, file } => commands::apps::configure(apps, file),
        Commands::Unblock { package } => commands::apps::unblock(&package),
        Commands::Blocked { json } => commands::apps::blocked(json),
        Commands::Usage { json } => commands::apps::usage(json),
        Commands::Status => commands::apps::status(),
        Commands::Run { stdin } => commands::run::run(stdin),
        Commands::Replay { file, until } => commands::replay::run(&file, until),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
