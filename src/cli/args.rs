//! Command line argument parsing for the Retina CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::feedback::Feedback;

/// Retina - weighted-feature image retrieval with relevance feedback
#[derive(Parser, Debug, Clone)]
#[command(name = "retina")]
#[command(about = "Index images by weighted features and search them in natural language")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct RetinaArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration file (JSON)
    #[arg(short, long, env = "RETINA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Feature store directory
    #[arg(short, long, env = "RETINA_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl RetinaArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }

    /// Default `tracing` filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "retina=info",
            _ => "retina=debug",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract and index features for images in the upload directory
    Ingest(IngestArgs),

    /// Rank indexed images against a query
    Search(SearchArgs),

    /// Mark a result as relevant or irrelevant for a query
    Feedback(FeedbackArgs),

    /// Record a free-text sentence describing an image
    Annotate(AnnotateArgs),

    /// Show feature store statistics
    Stats(StatsArgs),
}

/// Arguments for ingesting images
#[derive(Parser, Debug, Clone)]
pub struct IngestArgs {
    /// Image filenames, resolved against the upload directory
    #[arg(value_name = "FILENAME", required = true)]
    pub filenames: Vec<String>,

    /// Directory holding the uploaded images
    #[arg(short, long)]
    pub upload_dir: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Add synonym rows for the strongest classification labels
    #[arg(long)]
    pub enrich: bool,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Query sentence
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Return every ranked image
    #[arg(long, conflicts_with = "limit")]
    pub all: bool,
}

/// Arguments for relevance feedback
#[derive(Parser, Debug, Clone)]
pub struct FeedbackArgs {
    /// Image the judgement is about
    #[arg(value_name = "FILENAME")]
    pub filename: String,

    /// Query that produced the image
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// positive or negative (also +/-, up/down)
    #[arg(value_name = "FEEDBACK")]
    pub feedback: Feedback,
}

/// Arguments for annotating an image
#[derive(Parser, Debug, Clone)]
pub struct AnnotateArgs {
    /// Image the sentence describes
    #[arg(value_name = "FILENAME")]
    pub filename: String,

    /// Free-text description
    #[arg(value_name = "SENTENCE")]
    pub sentence: String,
}

/// Arguments for statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Fold the write-ahead log into a snapshot first
    #[arg(long)]
    pub compact: bool,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
