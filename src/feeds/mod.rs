//! Remote state store: Adafruit IO feeds scoped under a per-shop group.

pub mod client;
pub mod state;

pub use client::{AioClient, FeedStore};
pub use state::{Baseline, Counters};

use tracing::{debug, warn};

/// Feed keys under the shop's group.
pub mod keys {
    pub const DAILY_ORDER_COUNT: &str = "daily-order-count";
    pub const FAVORITE_COUNT: &str = "favorite-count";
    pub const RATING: &str = "rating";
    pub const RATING_COUNT: &str = "rating-count";
    pub const SOLD_COUNT: &str = "sold-count";
    pub const RESET_HOUR: &str = "reset-hour";
    pub const STARTING_STATS: &str = "starting-stats";
}

/// Feed keys with their dashboard display names, in creation order.
pub const FEED_NAMES: &[(&str, &str)] = &[
    (keys::DAILY_ORDER_COUNT, "Daily Order Count"),
    (keys::FAVORITE_COUNT, "Favorite Count"),
    (keys::RATING, "Rating"),
    (keys::RATING_COUNT, "Rating Count"),
    (keys::SOLD_COUNT, "Sold Count"),
    (keys::RESET_HOUR, "_Reset Hour"),
    (keys::STARTING_STATS, "_Starting Stats"),
];

/// Store facade with the tracker's error policy baked in.
///
/// Reads fall back to a default on any failure; writes are fire-and-forget
/// with a warning on failure. Neither ever aborts a cycle. When no store is
/// configured every read returns the default and every write is a no-op.
pub struct Feeds {
    store: Option<Box<dyn FeedStore>>,
}

impl Feeds {
    pub fn new(store: Option<Box<dyn FeedStore>>) -> Self {
        Self { store }
    }

    /// No store configured means the tracker runs scrape-and-log only.
    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&dyn FeedStore> {
        self.store.as_deref()
    }

    /// Reads a feed's latest value, swallowing errors.
    pub async fn receive_raw(&self, key: &str, silent: bool) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.receive(key).await {
            Ok(Some(value)) => {
                if !silent {
                    debug!("Feed {} has a value of {}", key, value);
                }
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("An error occurred getting feed {} value: {:#}", key, e);
                None
            }
        }
    }

    /// Reads a feed as an integer, validated once at this boundary.
    pub async fn receive_u64(&self, key: &str, default: u64, silent: bool) -> u64 {
        match self.receive_raw(key, silent).await {
            Some(raw) => parse_u64(&raw).unwrap_or_else(|| {
                warn!("Feed {} holds a non-integer value {:?}, using {}", key, raw, default);
                default
            }),
            None => default,
        }
    }

    /// Writes a value, swallowing errors (in-memory state is already updated).
    pub async fn send(&self, key: &str, value: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.send(key, value).await {
            warn!("An error occurred updating feed {} to {}: {:#}", key, value, e);
        }
    }
}

/// Integer parse tolerating a trailing decimal part ("14" and "14.0" both work).
fn parse_u64(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<u64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store used across the tracker's tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub values: Mutex<HashMap<String, String>>,
        pub fail_sends: bool,
    }

    #[async_trait]
    impl FeedStore for MemoryStore {
        async fn ensure_group(&self) -> Result<()> {
            Ok(())
        }

        async fn ensure_feed(&self, _key: &str, _name: &str) -> Result<bool> {
            Ok(false)
        }

        async fn receive(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn send(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_sends {
                anyhow::bail!("store offline");
            }
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn group_key(&self) -> &str {
            "teststore"
        }
    }

    #[tokio::test]
    async fn test_disabled_store_returns_defaults() {
        let feeds = Feeds::new(None);
        assert!(!feeds.enabled());
        assert_eq!(feeds.receive_u64(keys::RESET_HOUR, 14, false).await, 14);
        feeds.send(keys::SOLD_COUNT, "1").await; // no-op, must not panic
    }

    #[tokio::test]
    async fn test_receive_u64_parses_and_falls_back() {
        let store = MemoryStore::default();
        store.values.lock().unwrap().insert(keys::RESET_HOUR.into(), "9".into());
        store.values.lock().unwrap().insert(keys::SOLD_COUNT.into(), "garbage".into());

        let feeds = Feeds::new(Some(Box::new(store)));
        assert_eq!(feeds.receive_u64(keys::RESET_HOUR, 14, false).await, 9);
        assert_eq!(feeds.receive_u64(keys::SOLD_COUNT, 7, false).await, 7);
        assert_eq!(feeds.receive_u64(keys::DAILY_ORDER_COUNT, 0, false).await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let store = MemoryStore { fail_sends: true, ..Default::default() };
        let feeds = Feeds::new(Some(Box::new(store)));
        feeds.send(keys::SOLD_COUNT, "1").await; // warning only
    }

    #[test]
    fn test_parse_u64_tolerates_float_text() {
        assert_eq!(parse_u64("14"), Some(14));
        assert_eq!(parse_u64(" 14.0 "), Some(14));
        assert_eq!(parse_u64("-3"), None);
        assert_eq!(parse_u64("abc"), None);
    }
}
