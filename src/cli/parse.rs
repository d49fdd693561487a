//! CLI parse: clap types for examforge. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Examforge CLI - research-driven placement exam generation
#[derive(Parser, Debug)]
#[command(name = "examforge")]
#[command(about = "Generate company-specific placement practice tests")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a practice test for one company
    Generate {
        /// Company name, e.g. "TCS" or "Tata Consultancy Services"
        company: String,
        /// Exam year (defaults to pipeline.default_year)
        #[arg(long)]
        year: Option<u16>,
        /// Number of questions, 1-100 (defaults to pipeline.default_question_count)
        #[arg(long, short = 'n')]
        count: Option<u32>,
        /// Bypass both cache tiers
        #[arg(long)]
        force: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Generate tests for several companies concurrently
    Batch {
        /// Company names
        #[arg(required = true)]
        companies: Vec<String>,
        #[arg(long)]
        year: Option<u16>,
        #[arg(long, short = 'n')]
        count: Option<u32>,
        #[arg(long)]
        force: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show a stored test
    Show {
        test_id: u64,
        /// Include correct answers and explanations
        #[arg(long)]
        answers: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Storage, cache and pool statistics
    Stats {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Drop cached entries for a request
    Invalidate {
        #[arg(required_unless_present = "expired")]
        company: Option<String>,
        #[arg(long)]
        year: Option<u16>,
        #[arg(long, short = 'n')]
        count: Option<u32>,
        /// Also drop the research entry for the company and year
        #[arg(long)]
        research: bool,
        /// Sweep every expired entry instead
        #[arg(long, conflicts_with = "research")]
        expired: bool,
    },
    /// List supported companies
    Companies {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
