//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BidSwarm - Budgeted agent swarms for marketplace bidding
#[derive(Parser, Debug)]
#[command(name = "bidswarm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/bidswarm/config.yaml)
    #[arg(short, long, env = "BIDSWARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database (default: storage.path from the config)
    #[arg(long, env = "BIDSWARM_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration and, optionally, a swarm definition
    Validate {
        /// Swarm definition (YAML)
        #[arg(short, long)]
        swarm: Option<PathBuf>,
    },

    /// Dry-run a swarm against a simulated marketplace in virtual time
    Run {
        /// Swarm definition (YAML)
        #[arg(short, long)]
        swarm: PathBuf,

        /// Marketplace listings (JSON array)
        #[arg(short, long)]
        listings: PathBuf,

        /// Stop after this many virtual minutes (default: the swarm's window)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Persist swarms, agents and events to the configured database (implied by --db)
        #[arg(long)]
        persist: bool,

        /// Export the run's events and observations to a JSON Lines file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List stored swarms
    Swarms,

    /// Query a stored swarm's events
    Events {
        /// Swarm ID
        swarm_id: String,

        /// Filter by agent ID
        #[arg(short, long)]
        agent: Option<String>,

        /// Filter by listing ID
        #[arg(short = 'L', long)]
        listing: Option<String>,

        /// Filter by event type (e.g. BID_PLACED); repeatable
        #[arg(short = 't', long = "type")]
        event_types: Vec<String>,

        /// Keep only the most recent N events
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Write matching events to a JSON Lines file instead of printing
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Strategy rankings, cost efficiency and anomalies for a stored swarm
    Insights {
        /// Swarm ID
        swarm_id: String,
    },

    /// Print the Prometheus metrics registry
    Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "bidswarm",
            "run",
            "--swarm",
            "swarm.yaml",
            "--listings",
            "listings.json",
            "--duration",
            "30",
            "--db",
            "/tmp/run.db",
            "--persist",
        ]);
        match cli.command {
            Commands::Run {
                swarm,
                duration,
                persist,
                ..
            } => {
                assert_eq!(swarm, PathBuf::from("swarm.yaml"));
                assert_eq!(duration, Some(30));
                assert!(persist);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/run.db")));
    }

    #[test]
    fn test_parse_events_filters() {
        let cli = Cli::parse_from([
            "bidswarm", "events", "s-1", "-t", "BID_PLACED", "-t", "BID_WON", "-n", "5",
        ]);
        match cli.command {
            Commands::Events {
                swarm_id,
                event_types,
                limit,
                ..
            } => {
                assert_eq!(swarm_id, "s-1");
                assert_eq!(event_types, vec!["BID_PLACED", "BID_WON"]);
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
