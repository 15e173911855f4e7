//! CLI Module
//!
//! Command-line interface for rendering psalms.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Psalmody - render sung Latin psalms over a modal ambient bed
#[derive(Parser, Debug)]
#[command(name = "psalmody")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render text (and an optional melody) to WAV files
    #[command(name = "render")]
    Render(RenderArgs),

    /// Print the default render configuration as JSON
    #[command(name = "default-config")]
    DefaultConfig,

    /// Show how text splits into words
    #[command(name = "segment")]
    Segment {
        /// Text to segment
        #[arg(short, long)]
        text: String,
    },
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Psalm text
    #[arg(short, long, conflicts_with = "text_file", required_unless_present = "text_file")]
    pub text: Option<String>,

    /// File containing the psalm text
    #[arg(long)]
    pub text_file: Option<PathBuf>,

    /// Melody as "hz:sec,hz:sec,..."
    #[arg(short, long, conflicts_with = "melody_file")]
    pub melody: Option<String>,

    /// JSON file with an array of {"pitch_hz", "duration_sec"} events
    #[arg(long)]
    pub melody_file: Option<PathBuf>,

    /// JSON render configuration (defaults when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed for every randomized component
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of vocal layers
    #[arg(long)]
    pub layers: Option<u32>,

    /// WAV bit depth: 16, 24 or 32
    #[arg(long, default_value_t = 24)]
    pub bit_depth: u16,

    /// Output directory
    #[arg(short, long)]
    pub out: PathBuf,
}
