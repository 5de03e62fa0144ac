use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chunkstream")]
#[command(author, version, about = "Stream remote files to HTTP clients with byte-range support")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the backend reads planned for a range request
    Plan {
        /// Total file size in bytes
        #[arg(long)]
        size: u64,

        /// Range header value, e.g. "bytes=500000-2500000"
        #[arg(long)]
        range: Option<String>,

        /// Fetch granularity (defaults to the configured policy)
        #[arg(long)]
        chunk_size: Option<u64>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Display version information
    Version,
}
