use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::StatsProvider;
use crate::error::ProxyError;
use crate::stats::{DataKind, DateWindow};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";

const API_KEY_HEADER: &str = "x-apisports-key";

/// Statistics provider backed by API-Football v3.
/// Docs: <https://www.api-football.com/documentation-v3>
pub struct ApiFootball {
    http: Client,
    /// Marked sensitive so it never shows up in header debug output.
    api_key: Option<HeaderValue>,
    base_url: Url,
}

impl ApiFootball {
    pub fn new(api_key: Option<&str>, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API-Football base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API-Football base URL must be hierarchical: {}", base_url);
        }

        let api_key = match api_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                let mut value =
                    HeaderValue::from_str(key).context("API-Football key is not a valid header value")?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(ApiFootball {
            http,
            api_key,
            base_url,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full request URL for one data kind. The credential travels in a
    /// header, so the URL is safe to log.
    fn endpoint(&self, kind: DataKind, league_id: &str, season: &str, window: &DateWindow) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(upstream_path(kind));
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("league", league_id)
                .append_pair("season", season);
            match kind {
                DataKind::Fixtures => {
                    if let Some(from) = &window.from {
                        query.append_pair("from", from);
                    }
                    if let Some(to) = &window.to {
                        query.append_pair("to", to);
                    }
                }
                DataKind::Goalkeepers => {
                    query.append_pair("position", "Goalkeeper");
                }
                _ => {}
            }
        }
        url
    }
}

/// Path segments under the base URL for each data kind.
fn upstream_path(kind: DataKind) -> &'static [&'static str] {
    match kind {
        DataKind::Standings => &["standings"],
        DataKind::TopScorers => &["players", "topscorers"],
        DataKind::Fixtures => &["fixtures"],
        DataKind::Cards => &["players", "topyellowcards"],
        DataKind::Assists => &["players", "topassists"],
        DataKind::Goalkeepers => &["players"],
    }
}

#[async_trait]
impl StatsProvider for ApiFootball {
    fn name(&self) -> &str {
        "API-Football"
    }

    async fn fetch(
        &self,
        kind: DataKind,
        league_id: &str,
        season: &str,
        window: &DateWindow,
    ) -> Result<Value, ProxyError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProxyError::upstream(None, "API_FOOTBALL_KEY is not configured"));
        };

        let url = self.endpoint(kind, league_id, season, window);
        debug!("Fetching {} from {}", kind, url);

        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, api_key.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxyError::upstream(Some(status.as_u16()), body));
        }

        let raw: Value = resp.json().await.map_err(|e| {
            ProxyError::upstream(Some(status.as_u16()), format!("unreadable body: {}", e))
        })?;

        check_provider_errors(&raw, status.as_u16())?;
        Ok(raw)
    }
}

fn transport_error(err: reqwest::Error) -> ProxyError {
    let status = err.status().map(|s| s.as_u16());
    if err.is_timeout() {
        ProxyError::upstream(status, "request timed out")
    } else {
        ProxyError::upstream(status, format!("request failed: {}", err.without_url()))
    }
}

/// API-Football answers quota and auth problems with HTTP 200 and a
/// non-empty `errors` member (`[]` or `{}` when all is well).
fn check_provider_errors(raw: &Value, status: u16) -> Result<(), ProxyError> {
    let failed = match raw.get("errors") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if failed {
        return Err(ProxyError::upstream(Some(status), raw["errors"].to_string()));
    }
    Ok(())
}
