use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Root directory for the file cache; metadata lives in a
    /// `metadata/` subdirectory underneath it.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Outbound proxies, `scheme://[user:pass@]host:port`. Overridden by
    /// the PROXIES environment variable (comma-separated) when set.
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub refresh: RefreshSettings,

    #[serde(default)]
    pub rate_limits: RateLimitSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries in the resilient fetch layer, on top of proxy rotation.
    #[serde(default = "default_direct_retries")]
    pub direct_retries: usize,

    /// Minimum body length for a response to count as real content.
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshSettings {
    #[serde(default = "default_refresh_pages")]
    pub pages: u32,

    #[serde(default = "default_refresh_limit")]
    pub limit: usize,

    /// Auto-refresh period for the full catalog.
    #[serde(default = "default_refresh_interval_mins")]
    pub interval_mins: u64,

    /// Age beyond which a source's list triggers a background refresh.
    #[serde(default = "default_stale_ttl_mins")]
    pub stale_ttl_mins: u64,

    #[serde(default = "default_max_store_size")]
    pub max_store_size: usize,

    /// Language targets for language-partitioned sources.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Quota {
    pub max_requests: usize,
    pub window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    #[serde(default = "default_global_quota")]
    pub global: Quota,

    /// Per-source quotas; sources without one only pass the global limiter.
    #[serde(default = "default_source_quotas")]
    pub sources: HashMap<String, Quota>,
}

fn default_cache_dir() -> String {
    "cache".to_string()
}
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_direct_retries() -> usize {
    3
}
fn default_min_length() -> usize {
    400
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_refresh_pages() -> u32 {
    20
}
fn default_refresh_limit() -> usize {
    100
}
fn default_refresh_interval_mins() -> u64 {
    60
}
fn default_stale_ttl_mins() -> u64 {
    30
}
fn default_max_store_size() -> usize {
    5000
}
fn default_languages() -> Vec<String> {
    vec!["en".to_string(), "id".to_string()]
}
fn default_global_quota() -> Quota {
    Quota {
        max_requests: 30,
        window_ms: 60_000,
    }
}
fn default_source_quotas() -> HashMap<String, Quota> {
    let mut quotas = HashMap::new();
    // MangaDex allows 5 req/s; the scraped sites get 10/min each.
    quotas.insert(
        "mangadex".to_string(),
        Quota {
            max_requests: 5,
            window_ms: 1_000,
        },
    );
    quotas.insert(
        "komiku".to_string(),
        Quota {
            max_requests: 10,
            window_ms: 60_000,
        },
    );
    quotas.insert(
        "jikan".to_string(),
        Quota {
            max_requests: 10,
            window_ms: 60_000,
        },
    );
    quotas
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            direct_retries: default_direct_retries(),
            min_length: default_min_length(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            pages: default_refresh_pages(),
            limit: default_refresh_limit(),
            interval_mins: default_refresh_interval_mins(),
            stale_ttl_mins: default_stale_ttl_mins(),
            max_store_size: default_max_store_size(),
            languages: default_languages(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: default_global_quota(),
            sources: default_source_quotas(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            bind_addr: default_bind_addr(),
            proxies: Vec::new(),
            fetch: FetchSettings::default(),
            refresh: RefreshSettings::default(),
            rate_limits: RateLimitSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::from_file();
        if let Ok(env_proxies) = std::env::var("PROXIES") {
            let list: Vec<String> = env_proxies
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !list.is_empty() {
                log::info!("Loaded {} proxies from environment", list.len());
                config.proxies = list;
            }
        }
        config
    }

    fn from_file() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(cfg) = toml::from_str::<Config>(&content) {
                    return cfg;
                }
            }
        }
        Self::default()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_mins * 60)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh.stale_ttl_mins * 60)
    }

    pub fn source_quotas(&self) -> HashMap<String, (usize, Duration)> {
        self.rate_limits
            .sources
            .iter()
            .map(|(name, quota)| {
                (
                    name.clone(),
                    (quota.max_requests, Duration::from_millis(quota.window_ms)),
                )
            })
            .collect()
    }

    pub fn global_quota(&self) -> (usize, Duration) {
        (
            self.rate_limits.global.max_requests,
            Duration::from_millis(self.rate_limits.global.window_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.refresh.pages, 20);
        assert_eq!(config.refresh.limit, 100);
        assert_eq!(config.refresh.max_store_size, 5000);
        assert_eq!(config.fetch.min_length, 400);
        assert!(config.rate_limits.sources.contains_key("mangadex"));
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            cache_dir = "/tmp/manga-cache"

            [refresh]
            pages = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, "/tmp/manga-cache");
        assert_eq!(config.refresh.pages, 5);
        // Unspecified sections keep defaults.
        assert_eq!(config.refresh.limit, 100);
        assert_eq!(config.fetch.direct_retries, 3);
    }
}
