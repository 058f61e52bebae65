use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::AirportRegistry;
use crate::types::{AirportCode, FlightId, FlightRecord};

/// A flight between two stored airports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: FlightId,
    pub ident: String,
    pub origin: AirportCode,
    pub destination: AirportCode,
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
    pub updated_at: DateTime<Utc>,
}

impl Flight {
    /// Build a flight from a poll record. Returns `None` when the record has
    /// no id or an unusable airport code.
    pub fn from_record(record: &FlightRecord) -> Option<Self> {
        if record.id.trim().is_empty() {
            return None;
        }
        let origin = AirportCode::new(&record.origin).ok()?;
        let destination = AirportCode::new(&record.destination).ok()?;
        Some(Self {
            id: FlightId::new(record.id.trim()),
            ident: record.ident.clone(),
            origin,
            destination,
            filed_departure: record.filed_departure,
            actual_departure: record.actual_departure,
            estimated_arrival: record.estimated_arrival,
            actual_arrival: record.actual_arrival,
            aircraft_type: record.aircraft_type.clone(),
            updated_at: Utc::now(),
        })
    }

    pub fn has_departed(&self) -> bool {
        self.actual_departure.is_some()
    }

    pub fn has_arrived(&self) -> bool {
        self.actual_arrival.is_some()
    }
}

/// Merge one poll record into the store.
///
/// Both endpoints are resolved through the registry first, so an unseen
/// airport becomes a stub with its own metadata fetch. The flight row is then
/// upserted and the airports' `flights_to`/`flights_from` sets are relinked.
/// Nothing is committed here; the caller commits once per batch.
pub fn update(record: &FlightRecord, registry: &AirportRegistry) -> Option<FlightId> {
    let Some(flight) = Flight::from_record(record) else {
        debug!(id = %record.id, origin = %record.origin, destination = %record.destination,
            "dropping malformed flight record");
        return None;
    };

    registry.get_or_create(&flight.origin);
    registry.get_or_create(&flight.destination);

    let id = flight.id.clone();
    registry.store().upsert_flight(flight);
    Some(id)
}
