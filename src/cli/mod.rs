//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Ask questions about a document using semantic retrieval",
    long_about = "docqa ingests a document (PDF or text), splits it into overlapping word windows, \
                  embeds them, and answers questions by retrieving the most similar passages, \
                  optionally passing them to a language model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docqa/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the server in the foreground
    Serve,

    /// Replace the loaded document
    Ingest {
        /// PDF or plain text file
        file: PathBuf,

        /// Send the file contents instead of its path
        #[arg(long)]
        upload: bool,
    },

    /// Retrieve the passages most similar to a question
    Query {
        /// Question text
        question: String,

        /// Number of passages to return (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the document with the language model
    Ask {
        /// Question text
        question: String,

        /// Number of context passages (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show server and corpus status
    Status,

    /// Stop the server
    Stop,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

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
