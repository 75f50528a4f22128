//! CLI command definitions and parsing
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "geistfabrik",
    version,
    about = "Session-scoped semantic index and suggestion filter for a note vault",
    long_about = "GeistFabrik computes cached, date-anchored embeddings for a set of notes, answers \
                  graph and semantic queries about them, and filters generated suggestions for \
                  novelty, diversity and quality."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/geistfabrik/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON file holding the array of note records
    #[arg(short, long, global = true, value_name = "FILE")]
    pub notes: Option<PathBuf>,

    /// Session date (YYYY-MM-DD); defaults to today
    #[arg(short, long, global = true, value_name = "DATE")]
    pub date: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show note, link graph and cache statistics
    Stats {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the most linked-to notes
    Hubs {
        /// Number of hubs to show
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,
    },

    /// List notes with no resolved links in either direction
    Orphans,

    /// Show density clusters with their labels
    Clusters {
        /// Minimum cluster size (defaults to query.cluster_min_size)
        #[arg(short, long)]
        min_size: Option<usize>,
    },

    /// Show the most similar notes to a note
    Neighbours {
        /// Note path
        path: String,

        /// Number of neighbours to show
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,
    },

    /// Show similar note pairs that are not linked
    Unlinked {
        /// Number of pairs to show
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,

        /// Candidate pool size (defaults to query.unlinked_candidate_limit)
        #[arg(long)]
        candidates: Option<usize>,
    },

    /// Run suggestions through the filtering pipeline
    Filter {
        /// JSON file holding the array of suggestions
        suggestions: PathBuf,

        /// Record accepted suggestions in the history for the session date
        #[arg(long)]
        record: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
