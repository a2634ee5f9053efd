use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::is_valid_season;
use crate::upstream::api_football::DEFAULT_BASE_URL;

/// Caching proxy in front of API-Football for the analytics dashboard
#[derive(Parser, Debug, Clone)]
#[command(name = "sports-proxy", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// API-Football base URL
    #[arg(long, env = "API_FOOTBALL_URL", default_value = DEFAULT_BASE_URL)]
    pub api_football_url: String,

    /// API-Football key (every stats route fails upstream without it)
    #[arg(long, env = "API_FOOTBALL_KEY", hide_env_values = true)]
    pub api_football_key: Option<String>,

    /// How long a fetched table is served from cache, in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "120")]
    pub cache_ttl_secs: u64,

    /// Timeout for each upstream request, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "10")]
    pub upstream_timeout_secs: u64,

    /// Season used when neither the request nor the competition map names one
    #[arg(long, env = "DEFAULT_SEASON", default_value = "2024")]
    pub default_season: String,

    /// JSON object overriding the competition → league mapping,
    /// e.g. '{"copadobrasil": 73, "libertadores": {"league": 13, "season": "2025"}}'
    #[arg(long, env = "COMPETITION_MAP_JSON")]
    pub competition_map_json: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache_ttl_secs == 0 {
            anyhow::bail!("cache_ttl_secs must be positive");
        }
        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("upstream_timeout_secs must be positive");
        }
        if !is_valid_season(&self.default_season) {
            anyhow::bail!(
                "default_season must be a four-digit year, got {:?}",
                self.default_season
            );
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("listen_addr is not a socket address: {}", self.listen_addr);
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
