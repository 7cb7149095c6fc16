//! HTML parser for Etsy shop pages.

use crate::etsy::models::ShopStats;
use crate::etsy::selectors;
use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// A single metric failed to extract from markup that *should* have carried it.
///
/// Absence of a metric is not an error; only malformed markup is.
#[derive(Debug, Error)]
#[error("failed to extract {field}: {reason}")]
pub struct ExtractError {
    pub field: &'static str,
    pub reason: String,
}

impl ExtractError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// Parser for Etsy shop pages.
pub struct Parser {
    shop: String,
}

impl Parser {
    /// Creates a new parser for the given shop.
    pub fn new(shop: impl Into<String>) -> Self {
        Self { shop: shop.into() }
    }

    /// Parses a shop page into stats.
    ///
    /// Each of the five metrics is extracted in isolation: a failure bumps the
    /// error tally and leaves the remaining fields untouched. An empty page
    /// short-circuits to all-absent stats with one error.
    pub fn parse_shop(&self, html: &str) -> ShopStats {
        if html.trim().is_empty() {
            warn!("Nothing was returned for page source");
            return ShopStats::unavailable();
        }

        let document = Html::parse_document(html);
        let mut stats = ShopStats::default();

        match self.extract_favorite_count(&document) {
            Ok(value) => stats.favorite_count = value,
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
            }
        }

        let rating_input = document.select(&selectors::RATING_INPUT).next();

        match self.extract_rating(rating_input) {
            Ok(value) => stats.rating = value,
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
            }
        }

        // Only looked up relative to the rating element, as on the live page
        if let Some(input) = rating_input {
            match self.extract_rating_count(input) {
                Ok(value) => stats.rating_count = value,
                Err(e) => {
                    warn!("{}", e);
                    stats.errors += 1;
                }
            }
        }

        match self.extract_sold_count(&document) {
            Ok(value) => stats.sold_count = value,
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
            }
        }

        match self.extract_avatar_url(&document) {
            Ok(value) => stats.avatar_url = value,
            Err(e) => {
                warn!("{}", e);
                stats.errors += 1;
            }
        }

        debug!(
            "Parsed stats for {}: favorites {:?}, rating {:?} ({:?}), sold {:?}, {} error(s)",
            self.shop,
            stats.favorite_count,
            stats.rating,
            stats.rating_count,
            stats.sold_count,
            stats.errors
        );

        stats
    }

    /// Scans inline script blocks for the favorers-count literal.
    fn extract_favorite_count(&self, document: &Html) -> Result<Option<u64>, ExtractError> {
        for script in document.select(&selectors::SCRIPT) {
            let text = script.text().collect::<String>();
            if let Some(caps) = selectors::NUM_FAVORERS.captures(&text) {
                trace!("Found favorers literal: {}", &caps[1]);
                let count = caps[1]
                    .parse()
                    .map_err(|e| ExtractError::new("favorite_count", format!("{}: {}", &caps[1], e)))?;
                return Ok(Some(count));
            }
        }
        Ok(None)
    }

    /// Parses the rating input's value attribute as a decimal.
    fn extract_rating(&self, input: Option<ElementRef>) -> Result<Option<f64>, ExtractError> {
        let Some(input) = input else {
            return Ok(None);
        };

        let value = input
            .value()
            .attr("value")
            .ok_or_else(|| ExtractError::new("rating", "rating input has no value attribute"))?;

        let rating = value
            .parse()
            .map_err(|e| ExtractError::new("rating", format!("{:?}: {}", value, e)))?;

        Ok(Some(rating))
    }

    /// Finds the parenthesized rating count in the rating input's enclosing block.
    fn extract_rating_count(&self, input: ElementRef) -> Result<Option<u64>, ExtractError> {
        let scope = input
            .parent()
            .and_then(|p| p.parent())
            .and_then(ElementRef::wrap)
            .ok_or_else(|| ExtractError::new("rating_count", "rating input has no enclosing block"))?;

        for chunk in scope.text() {
            if let Some(caps) = selectors::RATING_COUNT.captures(chunk) {
                let count = caps[1]
                    .parse()
                    .map_err(|e| ExtractError::new("rating_count", format!("{}: {}", &caps[1], e)))?;
                return Ok(Some(count));
            }
        }

        Ok(None)
    }

    /// Finds the "<n> Sales" text node anywhere on the page.
    fn extract_sold_count(&self, document: &Html) -> Result<Option<u64>, ExtractError> {
        for chunk in document.root_element().text() {
            if let Some(caps) = selectors::SALES_TEXT.captures(chunk) {
                let digits = caps[1].replace(',', "");
                let count = digits
                    .parse()
                    .map_err(|e| ExtractError::new("sold_count", format!("{}: {}", digits, e)))?;
                return Ok(Some(count));
            }
        }
        Ok(None)
    }

    /// Takes the avatar image URL from the shop header block.
    fn extract_avatar_url(&self, document: &Html) -> Result<Option<String>, ExtractError> {
        let Some(container) = document.select(&selectors::AVATAR_CONTAINER).next() else {
            return Ok(None);
        };

        let image = container
            .select(&selectors::IMAGE)
            .next()
            .ok_or_else(|| ExtractError::new("avatar_url", "header block has no image"))?;

        match image.value().attr("src") {
            Some(src) => Ok(Some(src.to_string())),
            None => {
                debug!("Unable to get Avatar URL");
                Ok(None)
            }
        }
    }
}
