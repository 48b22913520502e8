use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "voicegate",
    version,
    about = "Real-time speech transcription gateway"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the WebSocket gateway (default if no subcommand)
    Serve,

    /// Show active sessions and segment storage usage
    Status,

    /// Check that the configured VAD and transcriber are reachable
    HealthCheck,
}
