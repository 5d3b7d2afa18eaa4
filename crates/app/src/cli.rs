use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Index, inspect and render recorded painting sessions.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
pub struct Cli {
    /// Engine configuration file (JSON). Falls back to $TESSERA_CONFIG.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the seek index next to a recording.
    Index {
        /// Recording file (.tsrec).
        recording: PathBuf,
    },
    /// Print message statistics and index status.
    Info { recording: PathBuf },
    /// Replay to a message position and write the canvas as an image.
    Render {
        recording: PathBuf,
        /// Message position to render. Defaults to the end of the recording.
        #[arg(long, value_name = "N")]
        at: Option<u64>,
        /// Output image. The format follows the extension.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Build the index first if it is missing or stale.
        #[arg(long)]
        build_index: bool,
    },
}
