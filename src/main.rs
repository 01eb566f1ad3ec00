//! trackcast - serve artist pages as podcast feeds
//!
//! Parses arguments, layers them over the optional TOML config file, and runs
//! the server until SIGINT/SIGTERM.

use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use trackcast::{Config, FeedConfig};

/// Republish artist pages as podcast RSS, caching media locally.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Base URL podcast clients use to reach this server
    #[arg(long, value_name = "URL")]
    public_url: Option<String>,

    /// Directory for cached media
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Maximum concurrent track downloads
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Serve a feed under /feeds/NAME (repeatable)
    #[arg(long = "feed", value_name = "NAME=URL", value_parser = parse_feed)]
    feeds: Vec<FeedConfig>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_feed(value: &str) -> Result<FeedConfig, String> {
    let (name, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL, got {value:?}"))?;
    Ok(FeedConfig {
        name: name.trim().to_string(),
        url: url.trim().to_string(),
    })
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "trackcast=info,tower_http=info",
        1 => "trackcast=debug,tower_http=debug",
        _ => "trackcast=trace,tower_http=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn load_config(args: Args) -> trackcast::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    if let Some(listen) = args.listen {
        config.server.bind_address = listen;
    }
    if let Some(public_url) = args.public_url {
        config.server.public_url = public_url;
    }
    if let Some(cache_dir) = args.cache_dir {
        config.cache.cache_dir = cache_dir;
    }
    if let Some(concurrency) = args.concurrency {
        config.cache.max_concurrent_downloads = concurrency;
    }
    for feed in args.feeds {
        // Command line wins over the file for the same name
        config.feeds.retain(|f| f.name != feed.name);
        config.feeds.push(feed);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        public_url = %config.server.public_url,
        cache_dir = %config.cache.cache_dir.display(),
        feeds = config.feeds.len(),
        "Starting trackcast"
    );

    match trackcast::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "trackcast stopped");
            ExitCode::FAILURE
        }
    }
}
