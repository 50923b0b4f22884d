//! Leadcall CLI: the `leadcall` command.

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::{EnvOverrides, FlagOverrides, Settings};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("leadcall={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::resolve(&EnvOverrides::from_env(), &FlagOverrides::from(&cli))
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        });

    match cli.command {
        Commands::Serve => commands::serve::run(settings),
        Commands::Config { json } => commands::config::run(settings, json),
    }
}
