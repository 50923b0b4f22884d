use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "leadcall",
    about = "Leadcall: fan out incoming leads to chat channels and arbitrate who calls them back",
    version
)]
pub struct Cli {
    /// Path to the TOML configuration file (missing default file is fine)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level for leadcall crates (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Intake bind address, e.g. 127.0.0.1:8000
    #[arg(long, global = true)]
    pub bind: Option<String>,

    /// Bot API base URL
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Long-poll timeout in seconds
    #[arg(long, global = true)]
    pub poll_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the intake endpoint and the bot until interrupted
    Serve,

    /// Print the resolved configuration (secrets redacted)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
