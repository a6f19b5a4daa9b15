use crate::types::{CollectorError, FetchConfig, Result};
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP fetch with a bounded per-request timeout and an explicit
/// bounded-retry policy. Every outbound request in the engine goes
/// through here, so a hung endpoint can never stall a source run past
/// the configured timeout.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Fetch a URL body as text (RSS/Atom feeds).
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get_retrying(url, None).await?;
        let body = response.text().await?;
        debug!(url, bytes = body.len(), "fetched feed body");
        Ok(body)
    }

    /// Fetch a URL with query parameters and parse the body as JSON
    /// (paginated topic APIs).
    pub async fn fetch_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let response = self.get_retrying(url, Some(query)).await?;
        let value = response.json().await?;
        Ok(value)
    }

    async fn get_retrying(&self, url: &str, query: Option<&[(&str, String)]>) -> Result<Response> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 8),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(url, attempt, "retrying fetch in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }

            let mut request = self.client.get(url);
            if let Some(query) = query {
                request = request.query(query);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    last_error = Some(CollectorError::General(format!(
                        "HTTP {} for {}",
                        response.status(),
                        url
                    )));
                }
                Err(e) => last_error = Some(CollectorError::Http(e)),
            }
        }

        Err(last_error
            .unwrap_or_else(|| CollectorError::General(format!("fetch failed for {url}"))))
    }
}
