use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::airport::Airport;
use crate::error::{EnrouteError, Result};
use crate::flight::Flight;
use crate::types::{AirportCode, FlightId};

use super::{Backend, ChangeSet};

/// Non-durable backend. Used by tests and by `--ephemeral` runs; commit
/// failures can be switched on to exercise the swallow-and-log paths.
#[derive(Default)]
pub struct MemoryBackend {
    airports: Mutex<BTreeMap<AirportCode, Airport>>,
    flights: Mutex<BTreeMap<FlightId, Flight>>,
    fail_commits: AtomicBool,
    writes: AtomicUsize,
    sizes: Mutex<Vec<(usize, usize)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write` fail until switched off again.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// `(airports, flights)` carried by each successful write, in order.
    pub fn write_sizes(&self) -> Vec<(usize, usize)> {
        self.sizes.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn airport_count(&self) -> usize {
        self.airports.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn flight_count(&self) -> usize {
        self.flights.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn stored_airport(&self, code: &AirportCode) -> Option<Airport> {
        self.airports.lock().ok()?.get(code).cloned()
    }
}

impl Backend for MemoryBackend {
    fn load_airports(&self) -> Result<Vec<Airport>> {
        let map = self
            .airports
            .lock()
            .map_err(|e| EnrouteError::Store(e.to_string()))?;
        Ok(map.values().cloned().collect())
    }

    fn load_flights(&self) -> Result<Vec<Flight>> {
        let map = self
            .flights
            .lock()
            .map_err(|e| EnrouteError::Store(e.to_string()))?;
        Ok(map.values().cloned().collect())
    }

    fn write(&self, changes: &ChangeSet) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(EnrouteError::Store("injected commit failure".into()));
        }
        let mut airports = self
            .airports
            .lock()
            .map_err(|e| EnrouteError::Store(e.to_string()))?;
        let mut flights = self
            .flights
            .lock()
            .map_err(|e| EnrouteError::Store(e.to_string()))?;
        for airport in &changes.airports {
            airports.insert(airport.code.clone(), airport.clone());
        }
        for flight in &changes.flights {
            flights.insert(flight.id.clone(), flight.clone());
        }
        if let Ok(mut sizes) = self.sizes.lock() {
            sizes.push((changes.airports.len(), changes.flights.len()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
