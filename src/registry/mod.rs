//! Competition registry: logical competition key → API-Football league/season.
//!
//! Built once at startup from the built-in table, optionally overlaid with a
//! JSON blob, then shared read-only. A competition may be registered without
//! a league id (regional cups whose provider id isn't generally known); its
//! routes exist but callers must pass `?league=`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ProxyError;

/// Built-in competitions and their API-Football league ids.
const BUILTIN_COMPETITIONS: &[(&str, Option<&str>)] = &[
    ("brasileirao", Some("71")),
    ("brasileirao-b", Some("72")),
    ("copadobrasil", None),
    ("premier", Some("39")),
    ("laliga", Some("140")),
    ("seriea-ita", Some("135")),
    ("libertadores", Some("13")),
    ("sudamericana", Some("11")),
    ("ucl", Some("2")),
    ("uel", Some("3")),
    ("ueconf", Some("848")),
];

/// Resolved upstream parameters for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetitionDescriptor {
    pub key: String,
    pub upstream_league_id: String,
    /// Season to query: the caller's override or the configured default.
    pub season: String,
}

/// A registered competition as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionEntry {
    pub key: String,
    #[serde(rename = "league")]
    pub league_id: Option<String>,
    #[serde(rename = "season")]
    pub default_season: String,
}

/// Request-level overrides taken from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub league: Option<String>,
    pub season: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompetitionRegistry {
    entries: BTreeMap<String, CompetitionEntry>,
    default_season: String,
}

impl CompetitionRegistry {
    /// Registry holding only the built-in table, every entry on `default_season`.
    pub fn builtin(default_season: &str) -> Self {
        let entries = BUILTIN_COMPETITIONS
            .iter()
            .map(|(key, league)| {
                (
                    key.to_string(),
                    CompetitionEntry {
                        key: key.to_string(),
                        league_id: league.map(str::to_string),
                        default_season: default_season.to_string(),
                    },
                )
            })
            .collect();
        CompetitionRegistry {
            entries,
            default_season: default_season.to_string(),
        }
    }

    /// Overlay a JSON object of `key → mapping` onto the registry.
    ///
    /// Accepted values: `"71"`, `71`, `""`/`null` (registered, unmapped) or
    /// `{"league": 71, "season": "2025"}`. Keys are lower-cased with `_`
    /// folded to `-`. Nothing is applied unless the whole blob is valid.
    /// Returns the number of entries applied.
    pub fn apply_overlay(&mut self, json: &str) -> Result<usize> {
        let raw: BTreeMap<String, OverlayValue> =
            serde_json::from_str(json).context("competition map must be a JSON object")?;

        let mut parsed = Vec::with_capacity(raw.len());
        for (raw_key, value) in raw {
            let key = normalize_key(&raw_key)
                .with_context(|| format!("invalid competition key {:?}", raw_key))?;
            let (league, season) = value.into_parts();

            let league_id = league.and_then(IdValue::into_id);
            if let Some(id) = &league_id {
                if !is_valid_league_id(id) {
                    anyhow::bail!("competition '{}': league id {:?} is not numeric", key, id);
                }
            }
            let default_season = match season.and_then(IdValue::into_id) {
                Some(s) if is_valid_season(&s) => s,
                Some(s) => anyhow::bail!("competition '{}': season {:?} is not a year", key, s),
                None => self.default_season.clone(),
            };

            parsed.push(CompetitionEntry {
                key,
                league_id,
                default_season,
            });
        }

        let applied = parsed.len();
        for entry in parsed {
            self.entries.insert(entry.key.clone(), entry);
        }
        Ok(applied)
    }

    /// Resolve `key` to upstream parameters. Overrides win over configuration.
    ///
    /// Fails with [`ProxyError::Configuration`] when neither the registry nor
    /// the caller provides a league id.
    pub fn resolve(
        &self,
        key: &str,
        overrides: &Overrides,
    ) -> Result<CompetitionDescriptor, ProxyError> {
        let entry = self.entries.get(key);

        let league = overrides
            .league
            .clone()
            .or_else(|| entry.and_then(|e| e.league_id.clone()));
        let Some(upstream_league_id) = league else {
            let message = match entry {
                Some(_) => format!(
                    "competition '{}' has no configured league id; pass the 'league' query parameter (e.g. ?league=ID)",
                    key
                ),
                None => format!(
                    "unknown competition '{}'; pass the 'league' query parameter (e.g. ?league=ID)",
                    key
                ),
            };
            return Err(ProxyError::Configuration(message));
        };

        let season = overrides
            .season
            .clone()
            .or_else(|| entry.map(|e| e.default_season.clone()))
            .unwrap_or_else(|| self.default_season.clone());

        Ok(CompetitionDescriptor {
            key: key.to_string(),
            upstream_league_id,
            season,
        })
    }

    pub fn get(&self, key: &str) -> Option<&CompetitionEntry> {
        self.entries.get(key)
    }

    /// All entries, ordered by key.
    pub fn list(&self) -> impl Iterator<Item = &CompetitionEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// API-Football league ids are positive integers.
pub fn is_valid_league_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 10 && id.bytes().all(|b| b.is_ascii_digit())
}

/// Seasons are four-digit start years, e.g. `2024`.
pub fn is_valid_season(season: &str) -> bool {
    season.len() == 4 && season.bytes().all(|b| b.is_ascii_digit())
}

/// Competition keys are lower-case ASCII words joined by `-`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase().replace('_', "-");
    is_valid_key(&key).then_some(key)
}

// ── Overlay parsing ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

impl IdValue {
    fn into_id(self) -> Option<String> {
        match self {
            IdValue::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            IdValue::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverlayValue {
    Plain(Option<IdValue>),
    Detailed {
        league: Option<IdValue>,
        season: Option<IdValue>,
    },
}

impl OverlayValue {
    fn into_parts(self) -> (Option<IdValue>, Option<IdValue>) {
        match self {
            OverlayValue::Plain(league) => (league, None),
            OverlayValue::Detailed { league, season } => (league, season),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CompetitionRegistry {
        CompetitionRegistry::builtin("2024")
    }

    #[test]
    fn test_builtin_resolves_default() {
        let d = registry().resolve("brasileirao", &Overrides::default()).unwrap();
        assert_eq!(d.upstream_league_id, "71");
        assert_eq!(d.season, "2024");
        assert_eq!(d.key, "brasileirao");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = Overrides {
            league: Some("999".into()),
            season: Some("2023".into()),
        };
        let d = registry().resolve("brasileirao-b", &overrides).unwrap();
        assert_eq!(d.upstream_league_id, "999");
        assert_eq!(d.season, "2023");

        let season_only = Overrides {
            league: None,
            season: Some("2022".into()),
        };
        let d = registry().resolve("brasileirao-b", &season_only).unwrap();
        assert_eq!(d.upstream_league_id, "72");
        assert_eq!(d.season, "2022");
    }

    #[test]
    fn test_unmapped_without_league_is_configuration_error() {
        let err = registry()
            .resolve("copadobrasil", &Overrides::default())
            .unwrap_err();
        match err {
            ProxyError::Configuration(msg) => {
                assert!(msg.contains("copadobrasil"), "{}", msg);
                assert!(msg.contains("league"), "{}", msg);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_with_league_override_resolves() {
        let overrides = Overrides {
            league: Some("73".into()),
            season: None,
        };
        let d = registry().resolve("copadobrasil", &overrides).unwrap();
        assert_eq!(d.upstream_league_id, "73");
        assert_eq!(d.season, "2024");
    }

    #[test]
    fn test_unknown_key() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("cup-b", &Overrides::default()),
            Err(ProxyError::Configuration(_))
        ));

        let overrides = Overrides {
            league: Some("500".into()),
            season: None,
        };
        let d = reg.resolve("cup-b", &overrides).unwrap();
        assert_eq!(d.upstream_league_id, "500");
        assert_eq!(d.season, "2024");
    }

    #[test]
    fn test_overlay_value_forms() {
        let mut reg = registry();
        let applied = reg
            .apply_overlay(
                r#"{
                    "top_flight_a": "71",
                    "Copadobrasil": 73,
                    "premier": null,
                    "cup-b": "",
                    "libertadores": { "league": 13, "season": "2025" }
                }"#,
            )
            .unwrap();
        assert_eq!(applied, 5);

        let d = reg.resolve("top-flight-a", &Overrides::default()).unwrap();
        assert_eq!(d.upstream_league_id, "71");

        let d = reg.resolve("copadobrasil", &Overrides::default()).unwrap();
        assert_eq!(d.upstream_league_id, "73");

        assert!(reg.resolve("premier", &Overrides::default()).is_err());
        assert!(reg.get("cup-b").is_some());
        assert!(reg.resolve("cup-b", &Overrides::default()).is_err());

        let d = reg.resolve("libertadores", &Overrides::default()).unwrap();
        assert_eq!((d.upstream_league_id.as_str(), d.season.as_str()), ("13", "2025"));
    }

    #[test]
    fn test_invalid_overlay_applies_nothing() {
        let mut reg = registry();
        let before = reg.len();

        assert!(reg.apply_overlay("[1, 2]").is_err());
        assert!(reg.apply_overlay(r#"{"new-cup": "12", "bad key!": "1"}"#).is_err());
        assert!(reg.apply_overlay(r#"{"new-cup": "abc"}"#).is_err());
        assert!(reg
            .apply_overlay(r#"{"new-cup": {"league": 5, "season": "next"}}"#)
            .is_err());

        assert_eq!(reg.len(), before);
        assert!(reg.get("new-cup").is_none());
    }

    #[test]
    fn test_list_is_sorted_by_key() {
        let reg = registry();
        let keys: Vec<&str> = reg.list().map(|e| e.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), BUILTIN_COMPETITIONS.len());
    }

    #[test]
    fn test_parameter_validation() {
        assert!(is_valid_league_id("71"));
        assert!(!is_valid_league_id(""));
        assert!(!is_valid_league_id("7a"));
        assert!(is_valid_season("2024"));
        assert!(!is_valid_season("24"));
        assert!(!is_valid_season("2024-25"));
        assert!(is_valid_key("brasileirao-b"));
        assert!(!is_valid_key("Cup_B"));
        assert!(!is_valid_key(""));
    }
}
