use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tagforged")]
#[command(author, version, about = "Batch audio conversion that keeps your tags")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert audio files, one at a time, preserving metadata
    Convert {
        /// Files to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target format (mp3, flac, wav, ogg, m4a)
        #[arg(short, long)]
        format: String,

        /// Directory to write converted files to
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Quality tier (low, standard, high, maximum)
        #[arg(short, long, default_value = "standard")]
        quality: String,

        /// Delete each source file after a successful conversion
        #[arg(long)]
        delete_source: bool,
    },

    /// Check that ffmpeg is available
    CheckTools,

    /// List supported formats and the encoder settings for each quality
    Formats,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
