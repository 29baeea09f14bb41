use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use feedpoll::commands::{Command, CommandError, CommandHandler};
use feedpoll::config::Config;
use feedpoll::feed::{build_client, HttpFetcher};
use feedpoll::poller::Poller;
use feedpoll::scheduler::Scheduler;
use feedpoll::sink::{DirectorySink, OutputSink, StdioSink};
use feedpoll::subscriptions::SubscriptionStore;

/// Get the config directory path (~/.config/feedpoll/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedpoll"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedpoll",
    about = "Polls subscribed feeds and forwards new items as they appear"
)]
struct Args {
    /// Config file (default: ~/.config/feedpoll/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subscription list, one URL per line
    #[arg(long, value_name = "FILE")]
    feeds: Option<PathBuf>,

    /// Hours between polling cycles
    #[arg(long, value_name = "HOURS")]
    interval: Option<u64>,

    /// Write buffers as files under this directory instead of stdout/stderr
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(hours) = args.interval {
        config.poll_interval_hours = hours;
    }
    if let Some(feeds) = args.feeds {
        config.feeds_file = Some(feeds);
    }
    if let Some(output) = args.output {
        config.output_dir = Some(output);
    }
    config.validate().context("Invalid configuration")?;

    let feeds_path = config
        .feeds_file
        .clone()
        .unwrap_or_else(|| config_dir.join("feeds"));
    let store = Arc::new(SubscriptionStore::new(&feeds_path));

    // The list is re-read every cycle; this only catches a missing file early.
    match store.list().await {
        Ok(urls) if urls.is_empty() => {
            eprintln!(
                "Warning: No feeds in {}. Add one with `subscribe <url>`.",
                feeds_path.display()
            );
        }
        Ok(urls) => {
            tracing::info!(feeds = urls.len(), path = %feeds_path.display(), "Loaded subscriptions");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Create the subscription file with one feed URL per line, e.g.:");
            eprintln!(
                "  echo https://example.com/feed.xml > {}",
                feeds_path.display()
            );
            std::process::exit(1);
        }
    }

    let sink: Arc<dyn OutputSink> = match &config.output_dir {
        Some(dir) => Arc::new(
            DirectorySink::create(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?,
        ),
        None => Arc::new(StdioSink),
    };

    let client = build_client().context("Failed to build HTTP client")?;
    let fetcher = Arc::new(HttpFetcher::new(client));
    let scheduler = Scheduler::new(Arc::clone(&store), fetcher);

    let cancel = CancellationToken::new();
    let (poller, refresh) = Poller::new(
        scheduler,
        Arc::clone(&sink),
        config.poll_interval(),
        cancel.clone(),
    );
    let mut poller_task = tokio::spawn(poller.run());

    let handler = CommandHandler::new(store, refresh, sink);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let result = loop {
        tokio::select! {
            result = &mut poller_task => break result,

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                cancel.cancel();
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = handler.execute_line(&line).await {
                        eprintln!("{}", e);
                        if matches!(e, CommandError::NotSupported(_)) {
                            eprint!("{}", Command::help());
                        }
                    }
                }
                Ok(None) => {
                    tracing::debug!("Command input closed");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read command input");
                    stdin_open = false;
                }
            },
        }
    };

    result
        .context("Poller task failed")?
        .context("Polling stopped")?;
    Ok(())
}
