use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EnrouteError;

// ---------------------------------------------------------------------------
// AirportCode
// ---------------------------------------------------------------------------

/// Natural key of an airport (ICAO or IATA code).
///
/// Always non-empty ASCII alphanumeric and stored upper-cased, so `"ksfo"`
/// and `" KSFO "` resolve to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AirportCode(String);

impl AirportCode {
    pub fn new(raw: &str) -> Result<Self, EnrouteError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EnrouteError::InvalidAirportCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AirportCode {
    type Err = EnrouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AirportCode::new(s)
    }
}

impl TryFrom<String> for AirportCode {
    type Error = EnrouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AirportCode::new(&value)
    }
}

impl From<AirportCode> for String {
    fn from(code: AirportCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// FlightId
// ---------------------------------------------------------------------------

/// Provider-assigned flight identifier, e.g. `UAL123-1601234567-airline-0123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightId(String);

impl FlightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AirportInfo
// ---------------------------------------------------------------------------

/// Airport metadata as returned by the provider. Never persisted directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirportInfo {
    #[serde(default, alias = "icao")]
    pub code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl AirportInfo {
    /// The validated code, or `None` for a malformed response.
    pub fn airport_code(&self) -> Option<AirportCode> {
        self.code
            .as_deref()
            .and_then(|raw| AirportCode::new(raw).ok())
    }

    /// Human-readable label built from an airport name and its location.
    ///
    /// `("John F Kennedy Intl", "New York, NY")` becomes
    /// `"New York, NY (John F Kennedy)"`; a name that only repeats the
    /// location collapses to the location alone.
    pub fn friendly_name(name: &str, location: &str) -> String {
        let mut words: Vec<&str> = name
            .split_whitespace()
            .filter(|w| !w.eq_ignore_ascii_case("intl") && !w.eq_ignore_ascii_case("int'l"))
            .collect();

        for component in location.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let needle: Vec<&str> = component.split_whitespace().collect();
            remove_word_runs(&mut words, &needle);
        }

        let short = words.join(" ");
        let location = location.trim();
        match (short.is_empty(), location.is_empty()) {
            (false, false) => format!("{location} ({short})"),
            (false, true) => short,
            (true, _) => location.to_string(),
        }
    }
}

fn remove_word_runs(words: &mut Vec<&str>, needle: &[&str]) {
    if needle.is_empty() {
        return;
    }
    let mut i = 0;
    while i + needle.len() <= words.len() {
        let hit = words[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));
        if hit {
            words.drain(i..i + needle.len());
        } else {
            i += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// FlightRecord
// ---------------------------------------------------------------------------

/// One flight as delivered in a poll batch.
///
/// Airport codes stay raw here; they are validated when the record is
/// merged so one bad record cannot poison a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub id: String,
    #[serde(default)]
    pub ident: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub filed_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    pub aircraft_type: Option<String>,
}
