use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error};

use crate::cache::CacheStore;
use crate::error::ProxyError;
use crate::registry::{
    is_valid_key, is_valid_league_id, is_valid_season, CompetitionEntry, CompetitionRegistry,
    Overrides,
};
use crate::stats::{normalize, CacheKey, DataKind, DateWindow, NormalizedRows};
use crate::upstream::StatsProvider;

pub type StatsCache = CacheStore<CacheKey, NormalizedRows, ProxyError>;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CompetitionRegistry>,
    pub cache: StatsCache,
    pub provider: Arc<dyn StatsProvider>,
    pub ttl: Duration,
}

/// Build the Axum router: one stats route per (competition, data kind)
/// plus the competition listing and health check.
///
/// Competitions missing from the registry fall through to `/:slug`, which
/// serves them when the caller names a `league`.
pub fn router(state: AppState) -> Router {
    let mut sports = Router::new()
        .route("/competitions", get(list_competitions_handler))
        .route("/competitions/:key", get(competition_handler))
        .route("/:slug", get(unregistered_stats_handler));

    for entry in state.registry.list() {
        for kind in DataKind::ALL {
            let path = format!("/{}-{}", entry.key, kind.route_suffix());
            sports = sports.route(&path, stats_route(entry.key.clone(), kind));
        }
    }

    Router::new()
        .route("/health", get(health_handler))
        .nest("/sports", sports)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Handler factory shared by every stats route.
fn stats_route(competition: String, kind: DataKind) -> MethodRouter<Arc<AppState>> {
    get(
        move |State(state): State<Arc<AppState>>, Query(query): Query<StatsQuery>| {
            let competition = competition.clone();
            async move { serve_stats(&state, &competition, kind, &query).await }
        },
    )
}

/// GET /sports/:slug for competition keys the registry doesn't know.
async fn unregistered_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Response {
    match split_slug(&slug) {
        Some((competition, kind)) => serve_stats(&state, competition, kind, &query)
            .await
            .into_response(),
        None => not_found(),
    }
}

/// Split `{competition}-{suffix}` on a known data kind suffix.
fn split_slug(slug: &str) -> Option<(&str, DataKind)> {
    DataKind::ALL.into_iter().find_map(|kind| {
        let competition = slug
            .strip_suffix(kind.route_suffix())?
            .strip_suffix('-')?;
        is_valid_key(competition).then_some((competition, kind))
    })
}

/// GET /sports/{competition}-{suffix}?league=&season=[&from=&to=]
async fn serve_stats(
    state: &AppState,
    competition: &str,
    kind: DataKind,
    query: &StatsQuery,
) -> Result<Json<NormalizedRows>, ProxyError> {
    let overrides = query.overrides()?;
    let window = query.window(kind)?;
    let descriptor = state.registry.resolve(competition, &overrides).map_err(|e| {
        debug!("Rejected {} {}: {}", competition, kind, e);
        e
    })?;

    let key = CacheKey::new(
        kind,
        &descriptor.upstream_league_id,
        &descriptor.season,
        &window,
    );

    let provider = Arc::clone(&state.provider);
    let league = descriptor.upstream_league_id.clone();
    let season = descriptor.season.clone();
    let result = state
        .cache
        .get_or_fetch(key.clone(), state.ttl, move || async move {
            let raw = provider.fetch(kind, &league, &season, &window).await?;
            normalize(kind, &raw)
        })
        .await;

    match result {
        Ok(rows) => {
            debug!("Serving {} rows for {} ({})", rows.len(), competition, key);
            Ok(Json(rows))
        }
        Err(err) => {
            error!("Failed to serve {} for {} ({}): {}", kind, competition, key, err);
            Err(err)
        }
    }
}

/// Query string accepted by every stats route. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    league: Option<String>,
    season: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl StatsQuery {
    fn overrides(&self) -> Result<Overrides, ProxyError> {
        let league = present(&self.league);
        if let Some(id) = &league {
            if !is_valid_league_id(id) {
                return Err(ProxyError::InvalidParameter {
                    name: "league",
                    value: id.clone(),
                });
            }
        }
        let season = present(&self.season);
        if let Some(s) = &season {
            if !is_valid_season(s) {
                return Err(ProxyError::InvalidParameter {
                    name: "season",
                    value: s.clone(),
                });
            }
        }
        Ok(Overrides { league, season })
    }

    /// Date window for fixture requests; ignored for every other kind.
    fn window(&self, kind: DataKind) -> Result<DateWindow, ProxyError> {
        if kind != DataKind::Fixtures {
            return Ok(DateWindow::default());
        }
        Ok(DateWindow {
            from: date_param("from", &self.from)?,
            to: date_param("to", &self.to)?,
        })
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn date_param(name: &'static str, value: &Option<String>) -> Result<Option<String>, ProxyError> {
    match present(value) {
        Some(v) if NaiveDate::parse_from_str(&v, "%Y-%m-%d").is_ok() => Ok(Some(v)),
        Some(v) => Err(ProxyError::InvalidParameter { name, value: v }),
        None => Ok(None),
    }
}

// ── Auxiliary routes ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CompetitionList<'a> {
    competitions: Vec<&'a CompetitionEntry>,
}

/// GET /sports/competitions
async fn list_competitions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(CompetitionList {
        competitions: state.registry.list().collect(),
    })
    .into_response()
}

/// GET /sports/competitions/:key
async fn competition_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CompetitionEntry>, Response> {
    state.registry.get(&key).cloned().map(Json).ok_or_else(not_found)
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    ok: bool,
    time: String,
    cache_entries: usize,
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        ok: true,
        time: Utc::now().to_rfc3339(),
        cache_entries: state.cache.len(),
    })
}
