//! Durable backend on redb.
//!
//! # Table design
//!
//! ```text
//! airports: code (str)      -> JSON-encoded Airport
//! flights:  flight id (str) -> JSON-encoded Flight
//! ```
//!
//! A commit writes both tables inside one write transaction, so a batch of
//! flight updates and the airport relinks they caused land together or not
//! at all.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::airport::Airport;
use crate::error::{EnrouteError, Result};
use crate::flight::Flight;

use super::{Backend, ChangeSet};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const AIRPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("airports");
const FLIGHTS: TableDefinition<&str, &[u8]> = TableDefinition::new("flights");

fn store_err(e: impl std::fmt::Display) -> EnrouteError {
    EnrouteError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbBackend
// ---------------------------------------------------------------------------

pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create the redb database at `path`.
    ///
    /// Creates both tables if they don't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        // Ensure the tables exist before any reads
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(AIRPORTS).map_err(store_err)?;
        wt.open_table(FLIGHTS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

impl Backend for RedbBackend {
    fn load_airports(&self) -> Result<Vec<Airport>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(AIRPORTS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let airport: Airport = serde_json::from_slice(v.value())?;
            result.push(airport);
        }
        Ok(result)
    }

    fn load_flights(&self) -> Result<Vec<Flight>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(FLIGHTS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let flight: Flight = serde_json::from_slice(v.value())?;
            result.push(flight);
        }
        Ok(result)
    }

    fn write(&self, changes: &ChangeSet) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut airports = wt.open_table(AIRPORTS).map_err(store_err)?;
            for airport in &changes.airports {
                let value = serde_json::to_vec(airport)?;
                airports
                    .insert(airport.code.as_str(), value.as_slice())
                    .map_err(store_err)?;
            }
            let mut flights = wt.open_table(FLIGHTS).map_err(store_err)?;
            for flight in &changes.flights {
                let value = serde_json::to_vec(flight)?;
                flights
                    .insert(flight.id.as_str(), value.as_slice())
                    .map_err(store_err)?;
            }
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::{AirportCode, AirportInfo, FlightId};
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Arc<RedbBackend>) {
        let dir = TempDir::new().unwrap();
        let db = RedbBackend::open(&dir.path().join("test.redb")).unwrap();
        (dir, Arc::new(db))
    }

    fn code(s: &str) -> AirportCode {
        AirportCode::new(s).unwrap()
    }

    #[test]
    fn empty_db_loads_nothing() {
        let (_dir, db) = open_tmp();
        assert!(db.load_airports().unwrap().is_empty());
        assert!(db.load_flights().unwrap().is_empty());
    }

    #[test]
    fn write_then_load_round_trips_airport_and_flight() {
        let (_dir, db) = open_tmp();
        let mut airport = Airport::stub(code("KSFO"));
        airport.apply_info(&AirportInfo {
            code: Some("KSFO".into()),
            latitude: Some(37.6),
            longitude: Some(-122.4),
            name: Some("San Francisco Intl".into()),
            location: Some("San Francisco, CA".into()),
            timezone: Some("America/Los_Angeles".into()),
        });
        airport.flights_from.insert(FlightId::new("F1"));
        let flight = Flight {
            id: FlightId::new("F1"),
            ident: "UAL1".into(),
            origin: code("KSFO"),
            destination: code("KJFK"),
            filed_departure: Some(Utc::now()),
            actual_departure: None,
            estimated_arrival: None,
            actual_arrival: None,
            aircraft_type: Some("B77W".into()),
            updated_at: Utc::now(),
        };
        db.write(&ChangeSet {
            airports: vec![airport.clone()],
            flights: vec![flight.clone()],
        })
        .unwrap();

        assert_eq!(db.load_airports().unwrap(), vec![airport]);
        assert_eq!(db.load_flights().unwrap(), vec![flight]);
    }

    #[test]
    fn rewrite_overwrites_by_key() {
        let (_dir, db) = open_tmp();
        let mut airport = Airport::stub(code("KSFO"));
        db.write(&ChangeSet {
            airports: vec![airport.clone()],
            flights: vec![],
        })
        .unwrap();
        airport.name = Some("Renamed".into());
        db.write(&ChangeSet {
            airports: vec![airport.clone()],
            flights: vec![],
        })
        .unwrap();

        let loaded = db.load_airports().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("enroute.redb");
        let id = {
            let store = Store::open(Arc::new(RedbBackend::open(&path).unwrap())).unwrap();
            let (airport, _) =
                store.get_or_insert_airport(&code("KJFK"), || Airport::stub(code("KJFK")));
            store.commit().unwrap();
            airport.id
        };
        let store = Store::open(Arc::new(RedbBackend::open(&path).unwrap())).unwrap();
        assert_eq!(store.airport(&code("KJFK")).unwrap().id, id);
    }
}
