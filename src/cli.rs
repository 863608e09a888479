//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch title content, metadata and seeds over HTTP.
///
/// Downloads go through the native HTTP stack with manual redirect handling
/// and gzip/deflate decoding, falling back to a full TLS client when the
/// native handshake fails.
#[derive(Parser, Debug)]
#[command(name = "hbfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL to a file or stdout
    Get {
        /// URL to download
        url: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Working buffer size in bytes (1-16777216)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=16_777_216))]
        buffer_size: Option<u64>,
    },

    /// Download and pretty-print a JSON document
    Json {
        /// URL of the document
        url: String,

        /// Largest accepted document in bytes (1-16777216)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=16_777_216))]
        max_size: Option<u64>,
    },

    /// Look up a title seed on the SD card, downloading it if missing
    Seed {
        /// Title id as 16 hex digits (optional 0x prefix)
        #[arg(value_parser = parse_title_id)]
        title_id: u64,

        /// Console region: code 0-6 or JPN/USA/EUR/AUS/CHN/KOR/TWN
        #[arg(short, long)]
        region: Option<String>,

        /// Directory standing in for the SD card root
        #[arg(long)]
        sd_root: Option<PathBuf>,
    },
}

fn parse_title_id(raw: &str) -> Result<u64, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() || digits.len() > 16 {
        return Err(format!("expected up to 16 hex digits, got {raw:?}"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid title id {raw:?}: {e}"))
}
