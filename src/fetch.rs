//! Resilient fetch layer on top of the proxy rotator
//!
//! An HTTP 200 is not enough: anti-bot interstitials come back as perfectly
//! valid responses. Bodies that are suspiciously short or that match known
//! block-page signatures are treated as failures and retried, on top of the
//! rotator's own retry loop. Trusted JSON APIs bypass all of that through
//! `fetch_json`.

use crate::proxy::ProxyManager;
use crate::rate_limiter::SourceLimiters;
use log::warn;
use rand::Rng;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// User agents to rotate through to avoid bot detection
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

const BLOCK_SIGNATURES: &[&str] = &["captcha", "cloudflare", "access denied", "just a moment"];
const BLOCK_SNIPPET_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response for {url} looks like a block page")]
    Blocked { url: String },
    #[error("response for {url} too short ({len} bytes)")]
    TooShort { url: String, len: usize },
    #[error("fetch failed for {url} after {attempts} attempts")]
    Exhausted { url: String, attempts: usize },
}

/// Heuristic block-page detection over the first 500 characters.
pub fn looks_blocked(html: &str) -> bool {
    let snippet: String = html
        .chars()
        .take(BLOCK_SNIPPET_LEN)
        .collect::<String>()
        .to_lowercase();
    BLOCK_SIGNATURES.iter().any(|sig| snippet.contains(sig))
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Retries at this layer, on top of the proxy rotator's attempts.
    pub direct_retries: usize,
    /// Bodies shorter than this are treated as failed fetches.
    pub min_length: usize,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            direct_retries: 3,
            min_length: 400,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct ResilientFetcher {
    proxies: Arc<ProxyManager>,
    limiters: Arc<SourceLimiters>,
    direct: Client,
    config: FetcherConfig,
}

impl ResilientFetcher {
    pub fn new(
        proxies: Arc<ProxyManager>,
        limiters: Arc<SourceLimiters>,
        config: FetcherConfig,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            "application/json, text/html, */*".parse().expect("static header"),
        );
        headers.insert(
            "Accept-Language",
            "en-US,en;q=0.9,id;q=0.8".parse().expect("static header"),
        );
        let direct = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            proxies,
            limiters,
            direct,
            config,
        })
    }

    /// Throttled, proxied HTML fetch with block-page detection. Exhausting
    /// the retry budget is an error the caller should treat as "no data
    /// for this attempt".
    pub async fn fetch_html(&self, source: &str, url: &str) -> Result<String, FetchError> {
        self.limiters.throttle(source).await;

        let mut last_error = FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.config.direct_retries,
        };

        for attempt in 0..self.config.direct_retries {
            match self.proxies.fetch_with_proxy(url).await {
                Ok(response) => match response.text().await {
                    Ok(body) => {
                        let trimmed = body.trim();
                        if trimmed.len() < self.config.min_length {
                            last_error = FetchError::TooShort {
                                url: url.to_string(),
                                len: trimmed.len(),
                            };
                        } else if looks_blocked(trimmed) {
                            last_error = FetchError::Blocked {
                                url: url.to_string(),
                            };
                        } else {
                            return Ok(trimmed.to_string());
                        }
                    }
                    Err(e) => last_error = FetchError::Http(e),
                },
                Err(e) => last_error = FetchError::Http(e),
            }

            if attempt + 1 < self.config.direct_retries {
                sleep(self.config.retry_delay * (attempt as u32 + 1)).await;
            }
        }

        warn!("[fetch] Giving up on {}: {}", url, last_error);
        Err(last_error)
    }

    /// Unthrottled JSON GET for trusted APIs. No proxy, no block detection.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .direct
            .get(url)
            .header("User-Agent", random_user_agent())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// Unthrottled text GET, same trust level as `fetch_json`.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .direct
            .get(url)
            .header("User-Agent", random_user_agent())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
