//! Tracker state: running counters and the persisted baseline blob.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last-observed metric values, mutated after each scrape.
///
/// These are the authoritative comparison values for change detection. A
/// `None` means the metric has never been observed successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    /// Number of completed orchestration cycles (diagnostic only)
    pub update_total: u64,
    pub favorite_count: Option<u64>,
    pub rating: Option<f64>,
    pub rating_count: Option<u64>,
    pub sold_count: Option<u64>,
    /// Sold-count increments observed since the last rollover
    pub daily_order_count: u64,
}

/// Snapshot of metric values at the last rollover, plus the rollover instant.
///
/// Persisted as a single JSON blob in the `starting-stats` feed so a restart
/// can resume the current reset window without losing its reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(rename = "starting-favorite-count")]
    pub favorite_count: u64,
    #[serde(rename = "starting-rating")]
    pub rating: f64,
    #[serde(rename = "starting-rating-count")]
    pub rating_count: u64,
    #[serde(rename = "starting-sold-count")]
    pub sold_count: u64,
    /// Unix timestamp (seconds) of the next rollover instant
    #[serde(rename = "reset-timestamp")]
    pub reset_timestamp: f64,
}

impl Baseline {
    /// Builds a baseline by snapshotting the current counters.
    pub fn snapshot(counters: &Counters, reset_timestamp: f64) -> Self {
        Self {
            favorite_count: counters.favorite_count.unwrap_or(0),
            rating: counters.rating.unwrap_or(0.0),
            rating_count: counters.rating_count.unwrap_or(0),
            sold_count: counters.sold_count.unwrap_or(0),
            reset_timestamp,
        }
    }

    /// Serializes the blob for the `starting-stats` feed.
    pub fn to_feed_value(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize baseline blob")
    }

    /// Parses a blob read back from the feed.
    ///
    /// The stored value may be Python-style stringified dict text with single
    /// quotes; quotes are normalized before parsing. Missing keys fall back to
    /// the supplied defaults, so a first-run sentinel like `{'first': 'run'}`
    /// yields the defaults untouched.
    pub fn from_feed_value(raw: &str, defaults: &Baseline) -> Result<Self> {
        let normalized = raw.replace('\'', "\"");
        let value: Value =
            serde_json::from_str(&normalized).context("Failed to parse baseline blob")?;

        Ok(Self {
            favorite_count: get_u64(&value, "starting-favorite-count")
                .unwrap_or(defaults.favorite_count),
            rating: get_f64(&value, "starting-rating").unwrap_or(defaults.rating),
            rating_count: get_u64(&value, "starting-rating-count")
                .unwrap_or(defaults.rating_count),
            sold_count: get_u64(&value, "starting-sold-count").unwrap_or(defaults.sold_count),
            reset_timestamp: get_f64(&value, "reset-timestamp").unwrap_or(defaults.reset_timestamp),
        })
    }
}

/// Loose numeric extraction: the feed may hold a JSON number or a stringified one.
fn get_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_u64(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
