//! CLI argument definitions using clap
//!
//! Commands:
//! - clusterkeeper validate --spec <path>
//! - clusterkeeper quorum --local <n> --remote <m>
//! - clusterkeeper simulate --scenario <path> [--config <path>] [--passes <n>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clusterkeeper - topology reconciliation for replicated database clusters
#[derive(Parser, Debug)]
#[command(name = "clusterkeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a cluster spec file
    Validate {
        /// Path to the cluster spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },

    /// Print the synchronous standby count for a topology size
    Quorum {
        /// Number of local instances
        #[arg(long)]
        local: usize,

        /// Number of remote-site IPs
        #[arg(long, default_value_t = 0)]
        remote: usize,
    },

    /// Run reconciliation passes against a simulated cluster
    Simulate {
        /// Path to the scenario file (JSON)
        #[arg(long)]
        scenario: PathBuf,

        /// Path to the operator configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of passes to run
        #[arg(long, default_value_t = 2)]
        passes: usize,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
