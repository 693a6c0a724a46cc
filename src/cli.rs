use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run translate-and-save cycles until the count is reached or the page
    /// stops responding
    Drive {
        /// Number of strings to process
        #[arg(short, long, default_value = "1")]
        count: u64,

        /// Stop at the first cycle that ends without a confirmed save
        #[arg(long)]
        strict: bool,
    },

    /// Run a single translate-and-save cycle
    Step,

    /// Advance to the next string without translating
    Skip,

    /// Return to the previous string
    Previous,

    /// Refocus the destination field to recover the editor state
    Reset,

    /// Probe the page and the translation service and report readiness
    Check,

    /// Run the local translation relay in front of the DeepL API
    Relay {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
}
