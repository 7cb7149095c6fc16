//! etsy-tracker - Etsy storefront stats tracker
//!
//! Scrapes a single shop's public page on a jittered interval, tracks deltas
//! against a daily reset baseline, and publishes values to Adafruit IO feeds
//! with change notifications to a Discord webhook.

pub mod config;
pub mod etsy;
pub mod feeds;
pub mod notify;
pub mod tracker;

pub use config::Config;
pub use etsy::{EtsyClient, Parser, ShopFetch, ShopStats};
pub use feeds::{AioClient, FeedStore, Feeds};
pub use notify::{Level, Notifier, NotifySink};
pub use tracker::{CycleReport, ResetWindow, Tracker};
