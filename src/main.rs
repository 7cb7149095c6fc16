//! etsy-tracker - Etsy storefront stats tracker
//!
//! A Rust implementation with TLS fingerprint emulation for reliable scraping.

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use etsy_tracker::etsy::{EtsyClient, Parser, ShopFetch};
use etsy_tracker::feeds::{AioClient, FeedStore, Feeds};
use etsy_tracker::notify::{Notifier, NotifySink};
use etsy_tracker::tracker::Tracker;
use etsy_tracker::Config;
use rand::RngExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "etsy-tracker";

#[derive(ClapParser)]
#[command(
    name = "etsy-tracker",
    version,
    about = "Etsy storefront stats tracker",
    long_about = "Scrapes a single Etsy shop's public page on a jittered interval, tracks \
                  deltas against a daily reset baseline, publishes values to Adafruit IO \
                  feeds, and sends change notifications to a Discord webhook."
)]
struct Cli {
    /// Etsy shop name to monitor
    #[arg(short, long, env = "ETSY_STORE_NAME")]
    shop: Option<String>,

    /// Hour of day (0-23) the daily counters reset at
    #[arg(long, env = "DEFAULT_RESET_HOUR", value_parser = clap::value_parser!(u32).range(0..24))]
    reset_hour: Option<u32>,

    /// Minutes between scrape cycles
    #[arg(short, long, env = "SCRAPE_INTERVAL_MINUTES")]
    interval: Option<u64>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, env = "ETSY_PROXY")]
    proxy: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(shop) = cli.shop {
        config.shop = shop;
    }
    if let Some(hour) = cli.reset_hour {
        config.default_reset_hour = hour;
    }
    if let Some(minutes) = cli.interval {
        config.scrape_interval_minutes = minutes;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }

    config.validate()?;

    let client = EtsyClient::new(&config).context("Failed to create HTTP client")?;
    let parser = Parser::new(config.shop.clone());

    // The very first fetch is startup-fatal: a tracker that cannot see the
    // page at all is better restarted by the supervisor
    let page = client
        .fetch_shop_page()
        .await
        .with_context(|| format!("Initial fetch of shop {} failed", config.shop))?;
    let initial = parser.parse_shop(&page.html);

    let notifier: Box<dyn NotifySink> = match &config.discord_webhook {
        Some(url) => {
            let avatar = initial.avatar_url.clone().or_else(|| config.discord_avatar_url.clone());
            Box::new(Notifier::with_webhook(SERVICE_NAME, url.clone(), avatar)?)
        }
        None => Box::new(Notifier::console(SERVICE_NAME)),
    };

    let store: Option<Box<dyn FeedStore>> =
        match (&config.aio_username, &config.aio_password) {
            (Some(username), Some(password)) => {
                debug!("Connecting to Adafruit IO as {}", username);
                Some(Box::new(AioClient::new(username, password, &config.shop)?))
            }
            _ => None,
        };

    let mut tracker =
        Tracker::bootstrap(&config, Box::new(client), Feeds::new(store), notifier, initial)
            .await?;

    info!("Scrapes will be performed about every {} minute(s)", config.scrape_interval_minutes);

    loop {
        let sleep_secs = jittered_sleep_secs(config.scrape_interval_minutes);
        debug!("Sleeping {}s until the next scrape", sleep_secs);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {
                let report = tracker.cycle().await;
                debug!(
                    "Cycle finished: {} write(s), {} notification(s), {} error(s)",
                    report.writes, report.notifications, report.errors
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracker.shutdown().await;
                break;
            }
        }
    }

    Ok(())
}

/// Randomized sleep so scrapes never land on a fixed clock grid.
///
/// Short intervals jitter upward, longer ones downward, keeping the average
/// near the configured value.
fn jittered_sleep_secs(interval_minutes: u64) -> u64 {
    let (low, high) = if interval_minutes > 10 {
        (interval_minutes - 5, interval_minutes)
    } else {
        (interval_minutes, interval_minutes + 5)
    };
    rand::rng().random_range(low * 60..=high * 60)
}
