//! Maps API-Football payloads onto the dashboard's row shapes.
//!
//! Every required field is looked up explicitly; absence, `null` or a wrong
//! JSON type is a [`ProxyError::Normalization`] naming the offending path.
//! Values are never defaulted, so a half-populated payload can't turn into
//! a table full of zeros.

use chrono::DateTime;
use serde_json::Value;

use super::models::{
    AssistRow, CardRow, DataKind, FixtureRow, GoalkeeperRow, NormalizedRows, ScorerRow,
    StandingsRow,
};
use crate::error::ProxyError;

/// Normalize a raw provider envelope (`{"response": [...]}`) for `kind`.
pub fn normalize(kind: DataKind, payload: &Value) -> Result<NormalizedRows, ProxyError> {
    let entries = payload
        .get("response")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("", "response"))?;

    match kind {
        DataKind::Standings => standings(entries).map(NormalizedRows::Standings),
        DataKind::TopScorers => player_rows(entries, |entry, at| {
            Ok(ScorerRow {
                name: str_at(entry, "player.name", at)?,
                team: str_at(entry, "statistics.0.team.name", at)?,
                goals: u32_at(entry, "statistics.0.goals.total", at)?,
            })
        })
        .map(NormalizedRows::Scorers),
        DataKind::Fixtures => fixtures(entries).map(NormalizedRows::Matches),
        DataKind::Cards => player_rows(entries, |entry, at| {
            Ok(CardRow {
                name: str_at(entry, "player.name", at)?,
                team: str_at(entry, "statistics.0.team.name", at)?,
                yellow: u32_at(entry, "statistics.0.cards.yellow", at)?,
                red: u32_at(entry, "statistics.0.cards.red", at)?,
            })
        })
        .map(NormalizedRows::Cards),
        DataKind::Assists => player_rows(entries, |entry, at| {
            Ok(AssistRow {
                name: str_at(entry, "player.name", at)?,
                team: str_at(entry, "statistics.0.team.name", at)?,
                assists: u32_at(entry, "statistics.0.goals.assists", at)?,
            })
        })
        .map(NormalizedRows::Assists),
        // Stock API-Football `/players` statistics carry no clean-sheet
        // counter; only feeds that add `games.cleansheets` normalize here.
        DataKind::Goalkeepers => player_rows(entries, |entry, at| {
            Ok(GoalkeeperRow {
                name: str_at(entry, "player.name", at)?,
                team: str_at(entry, "statistics.0.team.name", at)?,
                clean_sheets: u32_at(entry, "statistics.0.games.cleansheets", at)?,
            })
        })
        .map(NormalizedRows::Goalkeepers),
    }
}

/// Standings come nested as `response[*].league.standings[group][row]`.
/// Groups are flattened and the result ordered by position.
fn standings(entries: &[Value]) -> Result<Vec<StandingsRow>, ProxyError> {
    let mut rows = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let at = format!("response[{}]", i);
        let groups = lookup(entry, "league.standings")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(&at, "league.standings"))?;

        for (g, group) in groups.iter().enumerate() {
            let group_at = format!("{}.league.standings[{}]", at, g);
            let teams = group
                .as_array()
                .ok_or_else(|| ProxyError::Normalization(format!("{} is not an array", group_at)))?;

            for (r, team) in teams.iter().enumerate() {
                let row_at = format!("{}[{}]", group_at, r);
                rows.push(StandingsRow {
                    position: u32_at(team, "rank", &row_at)?,
                    team: str_at(team, "team.name", &row_at)?,
                    points: i32_at(team, "points", &row_at)?,
                    played: u32_at(team, "all.played", &row_at)?,
                    won: u32_at(team, "all.win", &row_at)?,
                    drawn: u32_at(team, "all.draw", &row_at)?,
                    lost: u32_at(team, "all.lose", &row_at)?,
                });
            }
        }
    }
    rows.sort_by_key(|r| r.position);
    Ok(rows)
}

fn fixtures(entries: &[Value]) -> Result<Vec<FixtureRow>, ProxyError> {
    let mut dated = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let at = format!("response[{}]", i);
        let raw_date = str_at(entry, "fixture.date", &at)?;
        let kickoff = DateTime::parse_from_rfc3339(&raw_date).map_err(|e| {
            ProxyError::Normalization(format!("{}.fixture.date {:?}: {}", at, raw_date, e))
        })?;

        let row = FixtureRow {
            date: kickoff.format("%Y-%m-%d").to_string(),
            home: str_at(entry, "teams.home.name", &at)?,
            away: str_at(entry, "teams.away.name", &at)?,
            time: kickoff.format("%H:%M").to_string(),
        };
        dated.push((kickoff, row));
    }
    dated.sort_by_key(|(kickoff, _)| *kickoff);
    Ok(dated.into_iter().map(|(_, row)| row).collect())
}

/// Player leaderboards share one envelope: `{player, statistics: [..]}`.
/// Provider order (already ranked) is preserved.
fn player_rows<T>(
    entries: &[Value],
    map: impl Fn(&Value, &str) -> Result<T, ProxyError>,
) -> Result<Vec<T>, ProxyError> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| map(entry, &format!("response[{}]", i)))
        .collect()
}

// ── Field access ──────────────────────────────────────────────────────────────

/// Walk a dotted path; numeric segments index into arrays.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, seg| match seg.parse::<usize>() {
        Ok(idx) => v.get(idx),
        Err(_) => v.get(seg),
    })
}

fn missing(at: &str, path: &str) -> ProxyError {
    if at.is_empty() {
        ProxyError::Normalization(format!("{} missing", path))
    } else {
        ProxyError::Normalization(format!("{}.{} missing", at, path))
    }
}

fn str_at(value: &Value, path: &str, at: &str) -> Result<String, ProxyError> {
    lookup(value, path)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(at, path))
}

fn i64_at(value: &Value, path: &str, at: &str) -> Result<i64, ProxyError> {
    let v = lookup(value, path).ok_or_else(|| missing(at, path))?;
    // Some API-Football mirrors serialise counters as strings.
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            ProxyError::Normalization(format!("{}.{} is not an integer: {}", at, path, v))
        })
}

fn u32_at(value: &Value, path: &str, at: &str) -> Result<u32, ProxyError> {
    let n = i64_at(value, path, at)?;
    u32::try_from(n)
        .map_err(|_| ProxyError::Normalization(format!("{}.{} out of range: {}", at, path, n)))
}

fn i32_at(value: &Value, path: &str, at: &str) -> Result<i32, ProxyError> {
    let n = i64_at(value, path, at)?;
    i32::try_from(n)
        .map_err(|_| ProxyError::Normalization(format!("{}.{} out of range: {}", at, path, n)))
}
