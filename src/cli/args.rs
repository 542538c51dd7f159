//! CLI argument definitions using clap
//!
//! Commands:
//! - keyspan init --config <path>
//! - keyspan start --config <path>
//! - keyspan check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// keyspan - online resharding and routing for range-partitioned tables
#[derive(Parser, Debug)]
#[command(name = "keyspan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration and create the data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./keyspan.json")]
        config: PathBuf,
    },

    /// Start the keyspan server
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./keyspan.json")]
        config: PathBuf,
    },

    /// Validate a configuration file and exit
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./keyspan.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
