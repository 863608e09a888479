//! CLI entry point for hbfetch.

use std::fs::File;
use std::io::{self, BufWriter, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hbfetch_core::download::DEFAULT_BUFFER_SIZE;
use hbfetch_core::{DownloadOptions, HttpClient, Region, SeedFetcher, VolumeRegistry};
use tracing::{debug, info};

mod app_config;
mod cli;
mod progress;

use app_config::{FileConfig, VerbositySetting};
use cli::{Args, Command};
use progress::ProgressSink;

const DEFAULT_JSON_MAX_SIZE: usize = 64 * 1024;

fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = app_config::load_default_file_config()?;
    let config = loaded.config.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match (args.verbose, config.verbosity) {
            (0, Some(VerbositySetting::Quiet)) => "error",
            (0, Some(VerbositySetting::Verbose)) | (1, _) => "debug",
            (0, Some(VerbositySetting::Debug)) => "trace",
            (0, _) => "info",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, config_path = ?loaded.path, "CLI arguments parsed");

    let client = HttpClient::with_options(download_options(&config))
        .context("Failed to initialise HTTP stack")?;

    match args.command {
        Command::Get {
            url,
            output,
            buffer_size,
        } => {
            let buffer_size = buffer_size
                .or(config.buffer_size)
                .map_or(Ok(DEFAULT_BUFFER_SIZE), usize::try_from)
                .context("buffer size does not fit in memory")?;
            let show_bar = !args.quiet && io::stderr().is_terminal();
            get(&client, &url, output, buffer_size, show_bar)
        }
        Command::Json { url, max_size } => {
            let max_size = max_size
                .or(config.json_max_size)
                .map_or(Ok(DEFAULT_JSON_MAX_SIZE), usize::try_from)
                .context("JSON size limit does not fit in memory")?;
            let doc = client
                .download_json(&url, max_size)
                .with_context(|| format!("Failed to fetch JSON from {url}"))?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        Command::Seed {
            title_id,
            region,
            sd_root,
        } => {
            let region = match region {
                Some(raw) => raw.parse::<Region>()?,
                None => config.region.unwrap_or(Region::America),
            };
            let sd_root = sd_root
                .or_else(|| config.sd_root.clone())
                .unwrap_or_else(|| PathBuf::from("."));

            let volumes = VolumeRegistry::new();
            let fetcher = SeedFetcher::new(&client, &volumes, sd_root);
            let seed = fetcher
                .fetch(title_id, region.code())
                .with_context(|| format!("Failed to obtain seed for {title_id:016X}"))?;
            println!("{}", hex(&seed));
            Ok(())
        }
    }
}

fn download_options(config: &FileConfig) -> DownloadOptions {
    let mut options = DownloadOptions::default();
    if let Some(size) = config.buffer_size.and_then(|size| usize::try_from(size).ok()) {
        options.buffer_size = size;
    }
    if let Some(secs) = config.timeout_secs {
        options.timeout = Duration::from_secs(secs);
    }
    if let Some(send) = config.send_user_agent {
        options.send_user_agent = send;
    }
    options
}

fn get(
    client: &HttpClient,
    url: &str,
    output: Option<PathBuf>,
    buffer_size: usize,
    show_bar: bool,
) -> Result<()> {
    let backend = match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            let mut sink = ProgressSink::new(BufWriter::new(file), show_bar);
            let backend = client.download(url, buffer_size, &mut sink)?;
            sink.finish()
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            backend
        }
        None => {
            let mut sink = ProgressSink::new(io::stdout().lock(), show_bar);
            let backend = client.download(url, buffer_size, &mut sink)?;
            sink.finish().context("Failed to write to stdout")?;
            backend
        }
    };
    info!(?backend, url = %url, "Download complete");
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}
