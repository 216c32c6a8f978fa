//! Command-line interface for the `lipsync` binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Talking-head video generation from registered speakers
#[derive(Parser, Debug)]
#[command(name = "lipsync", version, about = "Voice-cloned lip-sync video generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a speaker from a video and speak the first line
    Register {
        #[arg(long, value_name = "ID")]
        speaker_id: String,

        /// Source video of the speaker talking to camera
        #[arg(long, value_name = "PATH")]
        video: PathBuf,

        #[arg(long)]
        text: String,

        /// Language tag (en, hi)
        #[arg(long, value_name = "LANG", default_value = "en")]
        lang: String,
    },

    /// Generate a video of a registered speaker
    Speak {
        #[arg(long, value_name = "ID")]
        speaker_id: String,

        #[arg(long)]
        text: String,

        /// Language tag (en, hi)
        #[arg(long, value_name = "LANG", default_value = "en")]
        lang: String,

        /// Treat the text as a prompt and speak the dialogue engine's reply
        #[arg(long)]
        converse: bool,
    },

    /// Ask the dialogue engine a question, text only
    Ask { question: String },

    /// Report the external tools the pipeline depends on
    Tools,
}
