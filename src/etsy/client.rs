//! HTTP client for Etsy page fetches using wreq for TLS fingerprint emulation.

use crate::config::Config;
use crate::etsy::models::Page;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngExt;
use regex_lite::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;
use wreq_util::Emulation;

static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<title>(.*?)</title>").unwrap());

/// Trait for storefront page fetching - enables mocking for tests.
#[async_trait]
pub trait ShopFetch: Send + Sync {
    /// Fetches the shop's sold-items page and returns title + raw HTML.
    async fn fetch_shop_page(&self) -> Result<Page>;

    /// Looks up the public IP this process scrapes from.
    async fn public_ip(&self) -> Result<String>;

    /// Returns the configured shop name.
    fn shop(&self) -> &str;
}

/// Etsy HTTP client with browser impersonation and anti-bot measures.
pub struct EtsyClient {
    client: Client,
    shop: String,
    delay_ms: u64,
    delay_jitter_ms: u64,
    base_url: Option<String>,
}

impl EtsyClient {
    /// Creates a new Etsy client with the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, None)
    }

    /// Creates a new Etsy client with an optional custom base URL (for testing).
    pub fn with_base_url(config: &Config, base_url: Option<String>) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));

        // Configure proxy if specified
        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            shop: config.shop.clone(),
            delay_ms: config.delay_ms,
            delay_jitter_ms: config.delay_jitter_ms,
            base_url,
        })
    }

    /// Returns the base URL (custom for testing, or etsy.com for production).
    fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| "https://www.etsy.com".to_string())
    }

    /// Performs a GET request with all anti-bot measures.
    async fn get(&self, url: &str) -> Result<String> {
        // Add human-like delay with jitter
        self.delay().await;

        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Ch-Ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"")
            .header("Sec-Ch-Ua-Mobile", "?0")
            .header("Sec-Ch-Ua-Platform", "\"macOS\"")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 403 || status == 429 {
            warn!("Blocked ({}). Consider using a proxy or increasing the scrape interval.", status);
            anyhow::bail!("Blocked by Etsy ({}). Try a proxy or a longer interval.", status);
        }

        if !status.is_success() {
            anyhow::bail!("Request failed with status: {}", status);
        }

        response.text().await.context("Failed to read response body")
    }

    /// Adds a random delay to mimic human behavior.
    async fn delay(&self) {
        if self.delay_ms == 0 {
            return;
        }

        let jitter = if self.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.delay_jitter_ms)
        } else {
            0
        };

        let total_delay = self.delay_ms + jitter;
        debug!("Delaying {}ms", total_delay);
        tokio::time::sleep(Duration::from_millis(total_delay)).await;
    }
}

#[async_trait]
impl ShopFetch for EtsyClient {
    async fn fetch_shop_page(&self) -> Result<Page> {
        let url = format!("{}/shop/{}/sold", self.base_url(), urlencoding::encode(&self.shop));

        info!("Fetching shop page: {}", self.shop);
        let html = self.get(&url).await?;

        let title = TITLE.captures(&html).map(|caps| caps[1].trim().to_string());

        if html.is_empty() {
            debug!("No content for url {}. Page title: {:?}", url, title);
        }

        Ok(Page { title, html })
    }

    async fn public_ip(&self) -> Result<String> {
        if self.base_url.is_some() {
            // custom base URL means a test environment; never call out
            anyhow::bail!("public IP lookup disabled with a custom base URL");
        }

        let response = self
            .client
            .get("https://api.ipify.org")
            .send()
            .await
            .context("Failed to reach ipify")?;
        response.text().await.context("Failed to read ipify response")
    }

    fn shop(&self) -> &str {
        &self.shop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_test_config() -> Config {
        Config {
            shop: "TestStore".to_string(),
            delay_ms: 0,        // No delay for tests
            delay_jitter_ms: 0, // No jitter for tests
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;

        let html = r#"
            <html><head><title>TestStore on Etsy</title></head>
            <body><span>42 Sales</span></body></html>
        "#;

        Mock::given(method("GET"))
            .and(path("/shop/TestStore/sold"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&mock_server)
            .await;

        let config = make_test_config();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        let page = client.fetch_shop_page().await.unwrap();
        assert_eq!(page.title.as_deref(), Some("TestStore on Etsy"));
        assert!(page.html.contains("42 Sales"));
    }

    #[tokio::test]
    async fn test_blocked_403() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/shop/TestStore/sold"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let config = make_test_config();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        let result = client.fetch_shop_page().await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Blocked"));
    }

    #[tokio::test]
    async fn test_rate_limited_429() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/shop/TestStore/sold"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let config = make_test_config();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        let result = client.fetch_shop_page().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_http_error_500() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/shop/TestStore/sold"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let config = make_test_config();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        let result = client.fetch_shop_page().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_empty_body_is_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/shop/TestStore/sold"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&mock_server)
            .await;

        let config = make_test_config();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        let page = client.fetch_shop_page().await.unwrap();
        assert!(page.html.is_empty());
        assert!(page.title.is_none());
    }

    #[tokio::test]
    async fn test_shop_name_url_encoding() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/shop/My%20Store/sold"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let mut config = make_test_config();
        config.shop = "My Store".to_string();
        let client = EtsyClient::with_base_url(&config, Some(mock_server.uri())).unwrap();

        assert!(client.fetch_shop_page().await.is_ok());
    }

    #[tokio::test]
    async fn test_base_url_default() {
        let config = make_test_config();
        let client = EtsyClient::new(&config).unwrap();

        assert_eq!(client.base_url(), "https://www.etsy.com");
        assert_eq!(client.shop(), "TestStore");
    }
}
