//! Adafruit IO REST client for the per-shop feed group.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use wreq::Client;

/// Trait for the remote key/value feed store - enables mocking for tests.
///
/// Keys passed in are unscoped feed keys (`favorite-count`); implementations
/// scope them under the shop's group (`mystore.favorite-count`).
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Creates the shop's feed group if it does not exist.
    async fn ensure_group(&self) -> Result<()>;

    /// Creates a feed if it does not exist. Returns true if it was created.
    async fn ensure_feed(&self, key: &str, name: &str) -> Result<bool>;

    /// Reads the latest value of a feed, or None if it has no data.
    async fn receive(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value to a feed.
    async fn send(&self, key: &str, value: &str) -> Result<()>;

    /// Returns the group key feeds are scoped under.
    fn group_key(&self) -> &str;
}

/// Adafruit IO v2 REST client.
pub struct AioClient {
    client: Client,
    username: String,
    aio_key: String,
    group_name: String,
    group_key: String,
    base_url: String,
}

impl AioClient {
    /// Creates a client for the given account and shop.
    pub fn new(username: &str, aio_key: &str, shop: &str) -> Result<Self> {
        Self::with_base_url(username, aio_key, shop, "https://io.adafruit.com".to_string())
    }

    /// Creates a client against a custom endpoint (for testing).
    pub fn with_base_url(
        username: &str,
        aio_key: &str,
        shop: &str,
        base_url: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            username: username.to_string(),
            aio_key: aio_key.to_string(),
            group_name: shop.to_string(),
            group_key: shop.to_lowercase(),
            base_url,
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v2/{}/{}", self.base_url, self.username, path)
    }

    /// Adds the group prefix, so callers don't have to every time.
    fn scoped_key(&self, key: &str) -> String {
        format!("{}.{}", self.group_key, key)
    }

    async fn get(&self, url: &str) -> Result<wreq::Response> {
        self.client
            .get(url)
            .header("X-AIO-Key", &self.aio_key)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<wreq::Response> {
        self.client
            .post(url)
            .header("X-AIO-Key", &self.aio_key)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))
    }
}

#[async_trait]
impl FeedStore for AioClient {
    async fn ensure_group(&self) -> Result<()> {
        let response = self.get(&self.api(&format!("groups/{}", self.group_key))).await?;

        if response.status().is_success() {
            return Ok(());
        }

        if response.status() != 404 {
            anyhow::bail!("Group lookup failed with status: {}", response.status());
        }

        info!("Creating feed group \"{}\"", self.group_name);
        let body = json!({ "name": self.group_name, "key": self.group_key });
        let response = self.post_json(&self.api("groups"), &body).await?;
        if !response.status().is_success() {
            anyhow::bail!("Group creation failed with status: {}", response.status());
        }
        Ok(())
    }

    async fn ensure_feed(&self, key: &str, name: &str) -> Result<bool> {
        let scoped = self.scoped_key(key);
        let response = self.get(&self.api(&format!("feeds/{}", scoped))).await?;

        if response.status().is_success() {
            return Ok(false);
        }

        if response.status() != 404 {
            anyhow::bail!("Feed lookup for {} failed with status: {}", scoped, response.status());
        }

        info!("Creating feed \"{}\"", name);
        let body = json!({ "feed": { "name": name, "key": key } });
        let response =
            self.post_json(&self.api(&format!("groups/{}/feeds", self.group_key)), &body).await?;
        if !response.status().is_success() {
            anyhow::bail!("Feed creation for {} failed with status: {}", scoped, response.status());
        }
        Ok(true)
    }

    async fn receive(&self, key: &str) -> Result<Option<String>> {
        let scoped = self.scoped_key(key);
        let response = self.get(&self.api(&format!("feeds/{}/data/last", scoped))).await?;

        if response.status() == 404 {
            return Ok(None);
        }

        if !response.status().is_success() {
            anyhow::bail!("Read of feed {} failed with status: {}", scoped, response.status());
        }

        let text = response.text().await.context("Failed to read feed response body")?;
        let value: Value =
            serde_json::from_str(&text).context("Failed to parse feed response")?;

        Ok(match value.get("value") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }

    async fn send(&self, key: &str, value: &str) -> Result<()> {
        let scoped = self.scoped_key(key);
        debug!("Updating feed {} to {}", scoped, value);

        let body = json!({ "value": value });
        let response =
            self.post_json(&self.api(&format!("feeds/{}/data", scoped)), &body).await?;

        if !response.status().is_success() {
            anyhow::bail!("Write to feed {} failed with status: {}", scoped, response.status());
        }
        Ok(())
    }

    fn group_key(&self) -> &str {
        &self.group_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn make_client(server: &MockServer) -> AioClient {
        AioClient::with_base_url("user", "secret", "TestStore", server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_group_key_is_lowercased() {
        let server = MockServer::start().await;
        let client = make_client(&server).await;
        assert_eq!(client.group_key(), "teststore");
    }

    #[tokio::test]
    async fn test_ensure_group_exists() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/groups/teststore"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        assert!(client.ensure_group().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_group_creates_when_missing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/groups/teststore"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v2/user/groups"))
            .and(body_json(serde_json::json!({ "name": "TestStore", "key": "teststore" })))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        assert!(client.ensure_group().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_feed_creates_when_missing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/feeds/teststore.sold-count"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v2/user/groups/teststore/feeds"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        let created = client.ensure_feed("sold-count", "Sold Count").await.unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn test_ensure_feed_existing_not_created() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/feeds/teststore.sold-count"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        let created = client.ensure_feed("sold-count", "Sold Count").await.unwrap();
        assert!(!created);
    }

    #[tokio::test]
    async fn test_receive_string_value() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/feeds/teststore.sold-count/data/last"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"id":"0","value":"1234"}"#),
            )
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        let value = client.receive("sold-count").await.unwrap();
        assert_eq!(value.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_receive_numeric_value_stringified() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/feeds/teststore.rating/data/last"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value":4.5}"#))
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        let value = client.receive("rating").await.unwrap();
        assert_eq!(value.as_deref(), Some("4.5"));
    }

    #[tokio::test]
    async fn test_receive_missing_feed_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/user/feeds/teststore.sold-count/data/last"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        assert_eq!(client.receive("sold-count").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_posts_value() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/user/feeds/teststore.sold-count/data"))
            .and(body_json(serde_json::json!({ "value": "42" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        assert!(client.send("sold-count", "42").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_failure_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/user/feeds/teststore.sold-count/data"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = make_client(&server).await;
        assert!(client.send("sold-count", "42").await.is_err());
    }
}
