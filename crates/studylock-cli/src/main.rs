use std::env;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod blockers;
mod commands;
mod lock;
mod notify;

#[derive(Parser)]
#[command(name = "studylock", version, about = "Study Lock: Pomodoro timer with distraction blocking")]
struct Cli {
    /// Never touch the hosts file or running processes
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Suspend blocking for the configured override window
    Override {
        password: String,
    },
    /// Session statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Restore the hosts file from the backup taken before the first block
    RestoreHosts,
    /// Run the foreground daemon (reads commands from stdin)
    Run,
}

fn init_logging() {
    let filter = env::var("STUDYLOCK_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action, dry_run),
        Commands::Override { password } => commands::overrides::run(&password, dry_run),
        Commands::Stats { action } => commands::stats::run(action, dry_run),
        Commands::Config { action } => commands::config::run(action, dry_run),
        Commands::RestoreHosts => commands::restore_hosts::run(dry_run),
        Commands::Run => commands::run::run(dry_run),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
