//! Etsy storefront scraping: HTTP fetch, selectors, and the stat parser.

pub mod client;
pub mod models;
pub mod parser;
pub mod selectors;

pub use client::{EtsyClient, ShopFetch};
pub use models::{Page, ShopStats};
pub use parser::Parser;
