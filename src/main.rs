use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod cache;
mod config;
mod error;
mod registry;
mod stats;
mod upstream;

use api::{AppState, StatsCache};
use cache::SystemClock;
use config::Config;
use registry::CompetitionRegistry;
use upstream::{ApiFootball, StatsProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let mut registry = CompetitionRegistry::builtin(&config.default_season);
    if let Some(json) = &config.competition_map_json {
        // A broken overlay leaves the built-in table in place.
        match registry.apply_overlay(json) {
            Ok(applied) => info!("Applied {} competition mapping(s) from COMPETITION_MAP_JSON", applied),
            Err(e) => warn!("Ignoring COMPETITION_MAP_JSON: {:#}", e),
        }
    }
    let unmapped = registry.list().filter(|c| c.league_id.is_none()).count();
    info!(
        "{} competition(s) registered ({} without a league id)",
        registry.len(),
        unmapped
    );

    let provider = ApiFootball::new(
        config.api_football_key.as_deref(),
        &config.api_football_url,
        config.upstream_timeout(),
    )?;
    if !provider.has_api_key() {
        warn!("API_FOOTBALL_KEY is not set; every stats request will fail upstream");
    }
    info!(
        "Upstream: {} at {} (timeout {}s, cache TTL {}s)",
        provider.name(),
        config.api_football_url,
        config.upstream_timeout_secs,
        config.cache_ttl_secs
    );

    let state = AppState {
        registry: Arc::new(registry),
        cache: StatsCache::new(Arc::new(SystemClock)),
        provider: Arc::new(provider),
        ttl: config.cache_ttl(),
    };
    let app = api::router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Sports proxy listening on http://{}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
