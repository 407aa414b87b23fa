use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Format of `current.last_updated` in provider responses.
pub const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Current conditions for one city.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub temperature: f64,
    pub wind_kph: f64,
    pub humidity: f64,
    pub observed_at: DateTime<Utc>,
}

/// Category of a per-city fetch failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchErrorKind {
    /// Connection refused, timeout, DNS failure, truncated body.
    Transport,
    /// Provider answered with a non-success status.
    Upstream,
    /// Success status but the body lacks the expected fields.
    Parse,
    /// Anything else, including a panicked fetch task.
    Unexpected,
}

/// A categorized per-city failure. Recorded as an item result, never raised
/// past the executor's item loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[error("{kind} error: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Body of a successful `current.json` response.
#[derive(Debug, Deserialize)]
pub struct CurrentWeatherResponse {
    pub current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub wind_kph: f64,
    pub humidity: f64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<String>,
}

/// Any non-string `last_updated` is treated as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(raw)) => Some(raw),
        _ => None,
    })
}

impl CurrentConditions {
    /// Convert into a snapshot. An absent or malformed `last_updated` is
    /// replaced by `now` rather than rejected.
    pub fn into_snapshot(self, now: DateTime<Utc>) -> Snapshot {
        let observed_at = self
            .last_updated
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw.trim(), LAST_UPDATED_FORMAT).ok())
            .map(|naive| naive.and_utc())
            .unwrap_or(now);

        Snapshot {
            temperature: self.temp_c,
            wind_kph: self.wind_kph,
            humidity: self.humidity,
            observed_at,
        }
    }
}
