//! CSS selectors and text patterns for Etsy shop page parsing.
//!
//! This file contains all selectors and regexes used for parsing the shop
//! page. Update this file when Etsy changes their HTML structure.
//!
//! **Update process**: When parsing fails, capture HTML sample,
//! update selectors, and add test fixture.

use regex_lite::Regex;
use scraper::Selector;
use std::sync::LazyLock;

/// Inline script blocks, scanned for the favorers-count literal.
pub static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// JSON literal inside a script block carrying the shop's favorite count.
pub static NUM_FAVORERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""num_favorers":(\d+)"#).unwrap());

/// The hidden rating input that carries the shop's star rating.
pub static RATING_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name='rating']").unwrap());

/// Parenthesized rating count near the rating input, e.g. "(42)".
pub static RATING_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").unwrap());

/// Sales total text node, e.g. "12,345 Sales".
pub static SALES_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9][0-9,]*) Sales").unwrap());

/// Shop avatar container in the condensed header.
pub static AVATAR_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.condensed-header-shop-image").unwrap());

/// Image element, scoped under the avatar container.
pub static IMAGE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
