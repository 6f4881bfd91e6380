use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use std::io::Write;
use std::path::PathBuf;

use tubefeed::config::{normalize_channels, Config};
use tubefeed::feed::{FetchStrategy, VideoRecord};
use tubefeed::forward::{DiscordWebhook, Forwarder};
use tubefeed::render::{render_listing, render_page};
use tubefeed::util::atomic_write;

/// Terminal width assumed for the listing format
const LISTING_WIDTH: usize = 100;

/// Environment variable holding the Discord webhook URL for `--forward`
const WEBHOOK_ENV: &str = "TUBEFEED_DISCORD_WEBHOOK";

/// Get the config directory path (~/.config/tubefeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("tubefeed"))
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Format {
    /// Aligned text, one video per line
    #[default]
    List,
    /// JSON array of video records
    Json,
    /// Standalone HTML page with click-to-play thumbnails
    Html,
}

#[derive(Parser, Debug)]
#[command(
    name = "tubefeed",
    about = "Latest videos from a set of YouTube channels, fetched through CORS relays"
)]
struct Args {
    /// Config file (default: ~/.config/tubefeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Channel id to include; repeat to list several (replaces configured channels)
    #[arg(short, long = "channel", value_name = "ID")]
    channels: Vec<String>,

    /// Maximum number of videos to output
    #[arg(short = 'n', long, value_name = "N")]
    limit: Option<usize>,

    /// Query all relays at once instead of one after another
    #[arg(long)]
    race: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::List)]
    format: Format,

    /// Write output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Open the written file with the system's default handler
    #[arg(long, requires = "output")]
    open: bool,

    /// Post unseen videos to the Discord webhook in $TUBEFEED_DISCORD_WEBHOOK
    /// instead of printing a list
    #[arg(long, conflicts_with_all = ["output", "open"])]
    forward: bool,

    /// With --forward: keep running, one pass every `poll_interval_secs`
    #[arg(long, requires = "forward")]
    watch: bool,

    /// With --forward: file recording delivered links
    /// (default: ~/.config/tubefeed/seen.json)
    #[arg(long, value_name = "FILE", requires = "forward")]
    state: Option<PathBuf>,
}

fn render(videos: &[VideoRecord], format: Format) -> Result<String> {
    Ok(match format {
        Format::List => render_listing(videos, LISTING_WIDTH),
        Format::Json => {
            serde_json::to_string_pretty(videos).context("Failed to serialize videos")? + "\n"
        }
        Format::Html => render_page(videos),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for piped output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if !args.channels.is_empty() {
        config.channels = normalize_channels(&args.channels);
    }
    if let Some(limit) = args.limit {
        anyhow::ensure!(limit > 0, "--limit must be at least 1");
        config.max_videos = limit;
    }
    if args.race {
        config.strategy = FetchStrategy::Race;
    }

    if config.channels.is_empty() {
        anyhow::bail!("No valid channel ids to fetch");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("tubefeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    tracing::info!(
        channels = config.channels.len(),
        relays = config.relays.len(),
        strategy = ?config.strategy,
        "Fetching channel feeds"
    );

    if args.forward {
        return forward(&args, &config, client).await;
    }

    let videos = config
        .aggregator(client)
        .fetch_latest(&config.channels)
        .await;

    if videos.is_empty() {
        eprintln!("Warning: no videos could be loaded (all channels unreachable?)");
    }

    let output = render(&videos, args.format)?;

    match &args.output {
        Some(path) => {
            atomic_write(path, output.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} videos to {}", videos.len(), path.display());
            if args.open {
                open::that(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(output.as_bytes())
                .context("Failed to write output")?;
        }
    }

    Ok(())
}

async fn forward(args: &Args, config: &Config, client: reqwest::Client) -> Result<()> {
    let webhook_url = std::env::var(WEBHOOK_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .map(SecretString::from)
        .with_context(|| format!("{} must be set to use --forward", WEBHOOK_ENV))?;

    let state_path = match &args.state {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("seen.json"),
    };

    let mut forwarder = Forwarder::new(
        config.aggregator(client.clone()),
        DiscordWebhook::new(client, webhook_url),
        &state_path,
    )
    .with_context(|| format!("Failed to load state from {}", state_path.display()))?;

    if args.watch {
        tokio::select! {
            _ = forwarder.run(&config.channels, config.poll_interval()) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, exiting"),
        }
        return Ok(());
    }

    let report = forwarder.forward_once(&config.channels).await;
    eprintln!(
        "Forwarded {} videos ({} shorts skipped, {} to retry)",
        report.sent, report.skipped_shorts, report.failed
    );
    Ok(())
}
