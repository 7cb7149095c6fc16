//! Data models for scraped Etsy shop stats.

use serde::{Deserialize, Serialize};

/// One scrape's worth of shop metrics.
///
/// Every field is extracted independently; a field the page didn't yield is
/// `None`. `errors` counts extraction *failures* (malformed markup), not
/// absences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopStats {
    /// Number of people who favorited the shop
    pub favorite_count: Option<u64>,
    /// Overall star rating (0.0 - 5.0)
    pub rating: Option<f64>,
    /// Number of ratings behind the star rating
    pub rating_count: Option<u64>,
    /// Lifetime sales count
    pub sold_count: Option<u64>,
    /// Shop avatar image URL from the page header
    pub avatar_url: Option<String>,
    /// Count of per-field extraction failures for this scrape
    pub errors: u32,
}

impl ShopStats {
    /// Stats for a scrape whose fetch failed or returned nothing.
    pub fn unavailable() -> Self {
        Self { errors: 1, ..Self::default() }
    }

    /// True if every metric is absent.
    pub fn is_empty(&self) -> bool {
        self.favorite_count.is_none()
            && self.rating.is_none()
            && self.rating_count.is_none()
            && self.sold_count.is_none()
            && self.avatar_url.is_none()
    }
}

/// A fetched storefront page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Document title if one was present
    pub title: Option<String>,
    /// Raw HTML body
    pub html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_empty_with_error() {
        let stats = ShopStats::unavailable();
        assert!(stats.is_empty());
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_default_has_no_errors() {
        let stats = ShopStats::default();
        assert!(stats.is_empty());
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_partial_stats_not_empty() {
        let stats = ShopStats { sold_count: Some(12), ..Default::default() };
        assert!(!stats.is_empty());
    }
}
