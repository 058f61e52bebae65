use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::types::{AirportCode, AirportInfo, FlightId};

/// A locally stored airport, keyed by its code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub id: Uuid,
    pub code: AirportCode,
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
    #[serde(default)]
    pub flights_to: BTreeSet<FlightId>,
    #[serde(default)]
    pub flights_from: BTreeSet<FlightId>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Airport {
    /// A stub: only the identity and natural key are set.
    pub fn stub(code: AirportCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            latitude: None,
            longitude: None,
            name: None,
            location: None,
            timezone: None,
            flights_to: BTreeSet::new(),
            flights_from: BTreeSet::new(),
            updated_at: None,
        }
    }

    /// True until the first metadata merge lands.
    pub fn is_stub(&self) -> bool {
        self.updated_at.is_none()
    }

    /// Overwrite every metadata field with the incoming values (last write wins).
    pub fn apply_info(&mut self, info: &AirportInfo) {
        self.latitude = info.latitude;
        self.longitude = info.longitude;
        self.name = info.name.clone();
        self.location = info.location.clone();
        self.timezone = info.timezone.clone();
        self.updated_at = Some(Utc::now());
    }

    pub fn friendly_name(&self) -> String {
        let friendly = AirportInfo::friendly_name(
            self.name.as_deref().unwrap_or(""),
            self.location.as_deref().unwrap_or(""),
        );
        if friendly.is_empty() {
            self.code.to_string()
        } else {
            friendly
        }
    }

    /// Every flight arriving at or departing from this airport.
    pub fn related_flights(&self) -> BTreeSet<FlightId> {
        self.flights_to.union(&self.flights_from).cloned().collect()
    }

    /// Sort key: `location`, or the friendly name when this airport has none.
    pub fn sort_key(&self) -> String {
        match &self.location {
            Some(location) => location.clone(),
            None => self.friendly_name(),
        }
    }

    /// List ordering by location, falling back to the friendly name per side.
    /// Ties break on the code so the order is total.
    pub fn cmp_by_location(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.code.cmp(&other.code))
    }
}
