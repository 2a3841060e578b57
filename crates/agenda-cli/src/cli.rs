//! # CLI Structure and Argument Parsing
//!
//! The `agenda` command-line interface, built with `clap` derive macros.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # One question
//! agenda ask "¿Cuál es el teléfono de Luis Pérez?"
//!
//! # Interactive session with conversation context
//! agenda chat
//!
//! # Cache administration
//! agenda stats --json
//! agenda clear-cache --force
//! agenda warm --show
//! ```
//!
//! Global options (`--verbose`, `--quiet`, `--log-json`, `--config`, `--db`,
//! `--no-semantic-cache`, `--max-refinements`) apply to every command.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for the `agenda` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "agenda")]
#[command(version)]
#[command(about = "agenda - ask questions about your contact directory", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress informational messages (only show warnings and errors)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to an alternate config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Contact database to query
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Disable the semantic result cache
    #[arg(long, global = true)]
    pub no_semantic_cache: bool,

    /// Automatic refinement attempts per query
    #[arg(long, global = true, value_name = "N")]
    pub max_refinements: Option<u32>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Ask one question
    Ask {
        /// The question, in natural language
        #[arg(required = true, num_args = 1.., value_name = "QUERY")]
        query: Vec<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session that remembers recent turns
    Chat,

    /// Show cache statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear both result caches
    #[command(name = "clear-cache")]
    ClearCache {
        /// Skip the confirmation prompt
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Pre-populate the caches with common questions
    Warm {
        /// File with one question per line (defaults to a built-in list)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Clear the caches first
        #[arg(long)]
        clear: bool,

        /// Print each generated answer
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_joins_free_text_and_reads_global_flags() {
        let cli = Cli::try_parse_from([
            "agenda",
            "ask",
            "teléfono",
            "de",
            "Luis",
            "--json",
            "--max-refinements",
            "2",
            "--no-semantic-cache",
        ])
        .expect("valid args");

        match cli.command {
            Commands::Ask { query, json } => {
                assert_eq!(query.join(" "), "teléfono de Luis");
                assert!(json);
            },
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.max_refinements, Some(2));
        assert!(cli.no_semantic_cache);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["agenda", "-v", "-q", "chat"]).is_err());
    }

    #[test]
    fn warm_flags_parse() {
        let cli = Cli::try_parse_from(["agenda", "warm", "--clear", "--file", "q.txt"]).expect("valid args");
        match cli.command {
            Commands::Warm { file, clear, show } => {
                assert_eq!(file, Some(PathBuf::from("q.txt")));
                assert!(clear);
                assert!(!show);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
