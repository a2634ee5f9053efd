use serde::Serialize;
use std::fmt;

/// Category of statistic a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Standings,
    TopScorers,
    Fixtures,
    Cards,
    Assists,
    Goalkeepers,
}

impl DataKind {
    pub const ALL: [DataKind; 6] = [
        DataKind::Standings,
        DataKind::TopScorers,
        DataKind::Fixtures,
        DataKind::Cards,
        DataKind::Assists,
        DataKind::Goalkeepers,
    ];

    /// Route suffix the dashboard requests: `/sports/{competition}-{suffix}`.
    pub fn route_suffix(self) -> &'static str {
        match self {
            DataKind::Standings => "tabela",
            DataKind::TopScorers => "artilheiros",
            DataKind::Fixtures => "proximos",
            DataKind::Cards => "cartoes",
            DataKind::Assists => "assistencias",
            DataKind::Goalkeepers => "goleiros",
        }
    }

    /// Stable tag used as the first component of a cache key.
    pub fn cache_tag(self) -> &'static str {
        match self {
            DataKind::Standings => "standings",
            DataKind::TopScorers => "topscorers",
            DataKind::Fixtures => "fixtures",
            DataKind::Cards => "cards",
            DataKind::Assists => "assists",
            DataKind::Goalkeepers => "goalkeepers",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_tag())
    }
}

/// Optional `from`/`to` date filter for fixture requests (`YYYY-MM-DD`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateWindow {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Deterministic cache key for one upstream query.
///
/// Built only from the resolved upstream parameters, never from the
/// competition key, so two competitions aliasing the same league share
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: DataKind, league_id: &str, season: &str, window: &DateWindow) -> Self {
        let mut key = format!("{}:{}:{}", kind.cache_tag(), league_id, season);
        if kind == DataKind::Fixtures && !window.is_empty() {
            key.push_str(&format!(
                ":{}:{}",
                window.from.as_deref().unwrap_or(""),
                window.to.as_deref().unwrap_or("")
            ));
        }
        CacheKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Normalized rows ───────────────────────────────────────────────────────────
//
// Field names are part of the dashboard contract; do not rename.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingsRow {
    pub position: u32,
    pub team: String,
    /// Can go negative after point deductions.
    pub points: i32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScorerRow {
    pub name: String,
    pub team: String,
    pub goals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureRow {
    /// `YYYY-MM-DD`
    pub date: String,
    pub home: String,
    pub away: String,
    /// `HH:MM` in the offset reported by the provider
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRow {
    pub name: String,
    pub team: String,
    pub yellow: u32,
    pub red: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistRow {
    pub name: String,
    pub team: String,
    pub assists: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalkeeperRow {
    pub name: String,
    pub team: String,
    #[serde(rename = "cleanSheets")]
    pub clean_sheets: u32,
}

/// Normalized payload for one data kind.
///
/// Serializes as a single-key object, e.g. `{"standings": [...]}`, which is
/// exactly the response body of the corresponding route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedRows {
    Standings(Vec<StandingsRow>),
    Scorers(Vec<ScorerRow>),
    Matches(Vec<FixtureRow>),
    Cards(Vec<CardRow>),
    Assists(Vec<AssistRow>),
    Goalkeepers(Vec<GoalkeeperRow>),
}

impl NormalizedRows {
    pub fn len(&self) -> usize {
        match self {
            NormalizedRows::Standings(r) => r.len(),
            NormalizedRows::Scorers(r) => r.len(),
            NormalizedRows::Matches(r) => r.len(),
            NormalizedRows::Cards(r) => r.len(),
            NormalizedRows::Assists(r) => r.len(),
            NormalizedRows::Goalkeepers(r) => r.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
