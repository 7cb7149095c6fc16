//! The orchestration cycle: scrape, roll the reset window, diff, publish.

pub mod reset;

pub use reset::ResetWindow;

use crate::config::Config;
use crate::etsy::{Parser, ShopFetch, ShopStats};
use crate::feeds::state::{Baseline, Counters};
use crate::feeds::{keys, Feeds, FEED_NAMES};
use crate::notify::NotifySink;
use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{debug, warn};

const SERVICE_NAME: &str = "etsy-tracker";

/// What one orchestration cycle did, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Feed writes issued (attempted, independent of store success)
    pub writes: u32,
    /// Info/warning notifications emitted
    pub notifications: u32,
    /// Fetch/extraction errors observed
    pub errors: u32,
}

/// Single-shop stats tracker: owns the counters, the reset window, and the
/// collaborator handles. One instance per monitored store, driven by the
/// scheduler loop.
pub struct Tracker {
    shop: String,
    fetcher: Box<dyn ShopFetch>,
    parser: Parser,
    feeds: Feeds,
    notifier: Box<dyn NotifySink>,
    counters: Counters,
    window: ResetWindow,
}

impl Tracker {
    /// Builds the tracker from an already-performed initial scrape.
    ///
    /// The caller performs the first fetch so its failure stays startup-fatal;
    /// everything after this point is recoverable. Creates missing feeds,
    /// restores persisted state, and emits the startup banner.
    pub async fn bootstrap(
        config: &Config,
        fetcher: Box<dyn ShopFetch>,
        feeds: Feeds,
        notifier: Box<dyn NotifySink>,
        initial: ShopStats,
    ) -> Result<Self> {
        Self::bootstrap_at(config, fetcher, feeds, notifier, initial, Local::now()).await
    }

    /// `bootstrap` with an explicit clock, for tests.
    pub async fn bootstrap_at(
        config: &Config,
        fetcher: Box<dyn ShopFetch>,
        feeds: Feeds,
        notifier: Box<dyn NotifySink>,
        initial: ShopStats,
        now: DateTime<Local>,
    ) -> Result<Self> {
        if initial.errors > 0 {
            notifier
                .debug(&format!("Stats were returned with {} error(s)", initial.errors))
                .await;
        } else {
            notifier
                .debug(&format!(
                    "Initial stats were returned okay. Example... sold {:?}",
                    initial.sold_count
                ))
                .await;
        }

        let public_ip = match fetcher.public_ip().await {
            Ok(ip) => ip,
            Err(e) => {
                debug!("Could not determine public IP: {:#}", e);
                "unknown".to_string()
            }
        };
        notifier
            .info(&format!(
                "{} for **{}**\n\n\
                 -# Scraping for store metrics\n\
                 -# Scrapes every {} minutes\n\
                 -# Public IP: {}",
                SERVICE_NAME, config.shop, config.scrape_interval_minutes, public_ip
            ))
            .await;

        if !feeds.enabled() {
            notifier.warning("aio_username and/or aio_password were not provided").await;
        } else {
            Self::ensure_feeds(config, &feeds, &initial).await;
        }

        debug!("Loading stats from the feed store if they exist, otherwise using current stats");
        let mut counters = Counters {
            favorite_count: initial.favorite_count,
            rating: initial.rating,
            rating_count: initial.rating_count,
            sold_count: initial.sold_count,
            ..Default::default()
        };
        counters.daily_order_count = feeds.receive_u64(keys::DAILY_ORDER_COUNT, 0, false).await;

        let reset_hour = feeds
            .receive_u64(keys::RESET_HOUR, u64::from(config.default_reset_hour), false)
            .await;
        let reset_hour = u32::try_from(reset_hour).ok().filter(|h| *h < 24).unwrap_or_else(|| {
            warn!("Stored reset hour {} is out of range, using {}", reset_hour, config.default_reset_hour);
            config.default_reset_hour
        });

        let raw_blob = feeds.receive_raw(keys::STARTING_STATS, false).await;
        let fallback = Baseline::snapshot(&counters, 0.0);
        let window = ResetWindow::restore(reset_hour, raw_blob.as_deref(), fallback, now);

        let mut tracker = Self {
            shop: config.shop.clone(),
            fetcher,
            parser: Parser::new(config.shop.clone()),
            feeds,
            notifier,
            counters,
            window,
        };

        let mut report = CycleReport::default();
        tracker.validate_reset_hour(&mut report).await;
        tracker.log_current_stats();

        Ok(tracker)
    }

    /// Creates the feed group and any missing feeds, seeding initial values.
    async fn ensure_feeds(config: &Config, feeds: &Feeds, initial: &ShopStats) {
        let Some(store) = feeds.store() else {
            return;
        };

        debug!("Creating feed group and feeds if missing");
        if let Err(e) = store.ensure_group().await {
            warn!("Could not ensure feed group exists: {:#}", e);
        }

        for (key, name) in FEED_NAMES {
            let initial_value = match *key {
                keys::DAILY_ORDER_COUNT => Some("0".to_string()),
                keys::FAVORITE_COUNT => initial.favorite_count.map(|v| v.to_string()),
                keys::RATING => initial.rating.map(|v| v.to_string()),
                keys::RATING_COUNT => initial.rating_count.map(|v| v.to_string()),
                keys::SOLD_COUNT => initial.sold_count.map(|v| v.to_string()),
                keys::RESET_HOUR => Some(config.default_reset_hour.to_string()),
                keys::STARTING_STATS => Some(r#"{"first": "run"}"#.to_string()),
                _ => None,
            };

            match store.ensure_feed(key, name).await {
                Ok(true) => {
                    if let Some(value) = initial_value {
                        feeds.send(key, &value).await;
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Could not ensure feed {} exists: {:#}", key, e),
            }
        }
    }

    /// Runs one full orchestration cycle against the wall clock.
    pub async fn cycle(&mut self) -> CycleReport {
        self.cycle_at(Local::now()).await
    }

    /// `cycle` with an explicit clock, for tests.
    pub async fn cycle_at(&mut self, now: DateTime<Local>) -> CycleReport {
        let mut report = CycleReport::default();

        self.counters.update_total += 1;
        debug!("Checking {} for updates. Count: {}", self.shop, self.counters.update_total);

        // The desired hour can change remotely at any time
        self.validate_reset_hour(&mut report).await;

        let stats = self.scrape(&mut report).await;
        report.errors += stats.errors;

        if self.counters.update_total % 30 == 0 {
            self.log_current_stats();
        }

        if self.window.is_due(now) {
            self.notifier
                .info(&format!(
                    "Reset time of {} has been passed",
                    self.window.reset_at.format("%Y-%m-%d %H:%M:%S")
                ))
                .await;
            report.notifications += 1;
            self.reset(now, &mut report).await;
        }

        self.process_favorites(&stats, &mut report).await;
        self.process_rating(&stats, &mut report).await;
        self.process_orders(&stats, &mut report).await;

        report
    }

    /// Fetches and parses the shop page; failures degrade to empty stats.
    async fn scrape(&self, report: &mut CycleReport) -> ShopStats {
        match self.fetcher.fetch_shop_page().await {
            Ok(page) => self.parser.parse_shop(&page.html),
            Err(e) => {
                self.notifier
                    .warning(&format!("An error occurred fetching the shop page: {:#}", e))
                    .await;
                report.notifications += 1;
                ShopStats::unavailable()
            }
        }
    }

    /// Reconciles the reset hour against the remote store and realigns the
    /// rollover instant when it drifted. Persists the blob at most once.
    async fn validate_reset_hour(&mut self, report: &mut CycleReport) {
        let desired = self
            .feeds
            .receive_u64(keys::RESET_HOUR, u64::from(self.window.reset_hour), true)
            .await;

        if let Some(desired) = u32::try_from(desired).ok().filter(|h| *h < 24) {
            let previous = self.window.reset_hour;
            if self.window.adopt_hour(desired) {
                self.notifier
                    .info(&format!("Changing reset hour from {} to {}", previous, desired))
                    .await;
                report.notifications += 1;
            }
        } else {
            warn!("Remote reset hour {} is out of range, keeping {}", desired, self.window.reset_hour);
        }

        if self.window.needs_alignment() {
            let previous = self.window.reset_at;
            self.window.align();
            self.notifier
                .info(&format!(
                    "Changing reset time from {} to {}",
                    previous.format("%Y-%m-%d %H:%M:%S"),
                    self.window.reset_at.format("%Y-%m-%d %H:%M:%S")
                ))
                .await;
            report.notifications += 1;
            self.send_starting_stats(report).await;
        }
    }

    /// Rolls the window over: zeroes the daily order count, snapshots the
    /// counters as the new baselines, and publishes everything.
    async fn reset(&mut self, now: DateTime<Local>, report: &mut CycleReport) {
        self.counters.daily_order_count = 0;
        self.window.roll_over(&self.counters, now);

        self.send_counter(keys::DAILY_ORDER_COUNT, Some(self.counters.daily_order_count.to_string()), report)
            .await;
        self.send_counter(keys::FAVORITE_COUNT, self.counters.favorite_count.map(|v| v.to_string()), report)
            .await;
        self.send_counter(keys::RATING, self.counters.rating.map(|v| v.to_string()), report).await;
        self.send_counter(keys::RATING_COUNT, self.counters.rating_count.map(|v| v.to_string()), report)
            .await;
        self.send_counter(keys::SOLD_COUNT, self.counters.sold_count.map(|v| v.to_string()), report)
            .await;

        self.notifier
            .info(&format!(
                "Starting counts are reset to current stats. Next reset will occur at {}",
                self.window.reset_at.format("%Y-%m-%d %H:%M:%S")
            ))
            .await;
        report.notifications += 1;

        self.send_starting_stats(report).await;
    }

    async fn send_counter(&self, key: &str, value: Option<String>, report: &mut CycleReport) {
        match value {
            Some(value) => {
                self.feeds.send(key, &value).await;
                report.writes += 1;
            }
            None => debug!("Skipping write of {}: no value observed yet", key),
        }
    }

    /// Persists the baseline blob so a restart resumes the current window.
    async fn send_starting_stats(&self, report: &mut CycleReport) {
        match self.window.blob().to_feed_value() {
            Ok(value) => {
                self.feeds.send(keys::STARTING_STATS, &value).await;
                report.writes += 1;
            }
            Err(e) => warn!("Could not serialize baseline blob: {:#}", e),
        }
    }

    async fn process_favorites(&mut self, stats: &ShopStats, report: &mut CycleReport) {
        let Some(new) = stats.favorite_count else {
            return;
        };
        if self.counters.favorite_count == Some(new) {
            return;
        }

        self.notifier
            .info(&format!(
                "Favorites for **{}**\n\n-# Count changed `{}` -> `{}`",
                self.shop,
                fmt_opt_count(self.counters.favorite_count),
                group_digits(new)
            ))
            .await;
        report.notifications += 1;

        self.counters.favorite_count = Some(new);
        self.send_counter(keys::FAVORITE_COUNT, Some(new.to_string()), report).await;
    }

    async fn process_rating(&mut self, stats: &ShopStats, report: &mut CycleReport) {
        let rating_changed = stats.rating.is_some() && stats.rating != self.counters.rating;
        let count_changed =
            stats.rating_count.is_some() && stats.rating_count != self.counters.rating_count;
        if !rating_changed && !count_changed {
            return;
        }

        let mut message = format!(
            "Rating for **{}**\n\n-# Count changed `{}` -> `{}`",
            self.shop,
            fmt_opt_count(self.counters.rating_count),
            fmt_opt_count(stats.rating_count)
        );
        if let Some(new_count) = stats.rating_count {
            self.counters.rating_count = Some(new_count);
            self.send_counter(keys::RATING_COUNT, Some(new_count.to_string()), report).await;
        }

        // A rating shift of exactly 0.0 is not reported as a change
        let mut delta = 0.0;
        match (stats.rating, self.counters.rating) {
            (Some(new), Some(old)) if round4(new - old) != 0.0 => {
                delta = round4(new - old);
                message += &format!("\n-# Overall changed `{:.4}` -> `{:.4}`", old, new);
                self.counters.rating = Some(new);
                self.send_counter(keys::RATING, Some(new.to_string()), report).await;
            }
            (Some(new), None) => {
                message += &format!("\n-# Overall changed `none` -> `{:.4}`", new);
                self.counters.rating = Some(new);
                self.send_counter(keys::RATING, Some(new.to_string()), report).await;
            }
            _ => {
                message += &format!("\n-# Overall is `{}`", fmt_opt_rating(self.counters.rating));
            }
        }

        // A drop in rating is the one change worth a louder level
        if delta < 0.0 {
            self.notifier.warning(&message).await;
        } else {
            self.notifier.info(&message).await;
        }
        report.notifications += 1;
    }

    async fn process_orders(&mut self, stats: &ShopStats, report: &mut CycleReport) {
        let Some(new) = stats.sold_count else {
            return;
        };
        if self.counters.sold_count == Some(new) {
            return;
        }

        let mut message = format!(
            "Orders for **{}**\n\n-# Sold Count changed `{}` -> `{}`",
            self.shop,
            fmt_opt_count(self.counters.sold_count),
            group_digits(new)
        );

        // One increment per observed increase, regardless of magnitude; a
        // decrease (cancellation) never decrements within the window
        if self.counters.sold_count.is_some_and(|old| old < new) {
            message += &format!(
                "\n-# Daily Order Count changed from `{}` -> `{}`",
                group_digits(self.counters.daily_order_count),
                group_digits(self.counters.daily_order_count + 1)
            );
            self.counters.daily_order_count += 1;
            self.send_counter(
                keys::DAILY_ORDER_COUNT,
                Some(self.counters.daily_order_count.to_string()),
                report,
            )
            .await;
        } else {
            message +=
                &format!("\n-# Daily Order Count is `{}`", group_digits(self.counters.daily_order_count));
        }

        self.notifier.info(&message).await;
        report.notifications += 1;

        self.counters.sold_count = Some(new);
        self.send_counter(keys::SOLD_COUNT, Some(new.to_string()), report).await;
    }

    fn log_current_stats(&self) {
        debug!(
            "Current stats: daily-order-count {}, favorite-count {:?} (starting {}), \
             rating {:?} (starting {}), rating-count {:?} (starting {}), \
             sold-count {:?} (starting {}), reset-hour {}, reset-at {}",
            self.counters.daily_order_count,
            self.counters.favorite_count,
            self.window.baseline.favorite_count,
            self.counters.rating,
            self.window.baseline.rating,
            self.counters.rating_count,
            self.window.baseline.rating_count,
            self.counters.sold_count,
            self.window.baseline.sold_count,
            self.window.reset_hour,
            self.window.reset_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    /// Final log line before the process exits.
    pub async fn shutdown(&self) {
        self.notifier
            .info(&format!("{} for **{}**\n\n-# Exiting", SERVICE_NAME, self.shop))
            .await;
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn window(&self) -> &ResetWindow {
        &self.window
    }

    pub fn shop(&self) -> &str {
        &self.shop
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Thousands-separated rendering, e.g. 12345 -> "12,345".
fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn fmt_opt_count(value: Option<u64>) -> String {
    value.map(group_digits).unwrap_or_else(|| "none".to_string())
}

fn fmt_opt_rating(value: Option<f64>) -> String {
    value.map(|r| format!("{:.4}", r)).unwrap_or_else(|| "none".to_string())
}
