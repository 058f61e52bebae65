//! Local entity store.
//!
//! [`Store`] is a working-set context in front of a durable [`Backend`].
//! Reads and writes hit the in-memory set; [`Store::commit`] pushes every
//! dirty record to the backend in one transaction. A failed commit leaves
//! the working set as it is and keeps the records dirty, so the next commit
//! carries them again.
//!
//! Writers that stage several records which must reach the backend together
//! hold a [`CommitScope`] while staging. Every other commit waits for the
//! scope to close, so a half-staged batch is never written.

pub mod memory;
pub mod redb;

pub use self::memory::MemoryBackend;
pub use self::redb::RedbBackend;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::airport::Airport;
use crate::error::Result;
use crate::flight::Flight;
use crate::types::{AirportCode, FlightId};

/// Durable persistence behind a [`Store`].
pub trait Backend: Send + Sync {
    fn load_airports(&self) -> Result<Vec<Airport>>;
    fn load_flights(&self) -> Result<Vec<Flight>>;
    /// Persist all records in `changes` atomically.
    fn write(&self, changes: &ChangeSet) -> Result<()>;
}

/// Records written by a single commit.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub airports: Vec<Airport>,
    pub flights: Vec<Flight>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.airports.is_empty() && self.flights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.airports.len() + self.flights.len()
    }
}

#[derive(Default)]
struct WorkingSet {
    airports: BTreeMap<AirportCode, Airport>,
    flights: BTreeMap<FlightId, Flight>,
    dirty_airports: BTreeSet<AirportCode>,
    dirty_flights: BTreeSet<FlightId>,
}

impl WorkingSet {
    fn touch_airport(&mut self, code: &AirportCode) {
        self.dirty_airports.insert(code.clone());
    }
}

pub struct Store {
    backend: Arc<dyn Backend>,
    inner: Mutex<WorkingSet>,
    commit_gate: Mutex<()>,
}

/// Exclusive right to commit, held while a unit of work is staged.
///
/// Dropping the scope without calling [`commit`](Self::commit) leaves the
/// staged records dirty for whoever commits next.
pub struct CommitScope<'a> {
    store: &'a Store,
    _gate: MutexGuard<'a, ()>,
}

impl CommitScope<'_> {
    pub fn commit(self) -> Result<usize> {
        self.store.write_dirty()
    }
}

impl Store {
    /// Load every stored record from `backend` into a fresh working set.
    pub fn open(backend: Arc<dyn Backend>) -> Result<Self> {
        let mut set = WorkingSet::default();
        for airport in backend.load_airports()? {
            set.airports.insert(airport.code.clone(), airport);
        }
        for flight in backend.load_flights()? {
            set.flights.insert(flight.id.clone(), flight);
        }
        debug!(
            airports = set.airports.len(),
            flights = set.flights.len(),
            "store opened"
        );
        Ok(Self {
            backend,
            inner: Mutex::new(set),
            commit_gate: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WorkingSet> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Airports
    // -----------------------------------------------------------------------

    pub fn airport(&self, code: &AirportCode) -> Option<Airport> {
        self.lock().airports.get(code).cloned()
    }

    pub fn airports(&self) -> Vec<Airport> {
        self.lock().airports.values().cloned().collect()
    }

    pub fn find_airports(&self, predicate: impl Fn(&Airport) -> bool) -> Vec<Airport> {
        self.lock()
            .airports
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect()
    }

    /// Return the airport for `code`, staging `make()` first if none exists.
    ///
    /// The lookup and the insert share one lock, so two callers racing on the
    /// same code observe a single record. The flag is `true` when this call
    /// created it.
    pub fn get_or_insert_airport(
        &self,
        code: &AirportCode,
        make: impl FnOnce() -> Airport,
    ) -> (Airport, bool) {
        let mut set = self.lock();
        if let Some(existing) = set.airports.get(code) {
            return (existing.clone(), false);
        }
        let airport = make();
        set.airports.insert(code.clone(), airport.clone());
        set.touch_airport(code);
        (airport, true)
    }

    /// Mutate a stored airport in place and mark it dirty.
    pub fn update_airport(
        &self,
        code: &AirportCode,
        f: impl FnOnce(&mut Airport),
    ) -> Option<Airport> {
        let mut set = self.lock();
        let airport = set.airports.get_mut(code)?;
        f(airport);
        let updated = airport.clone();
        set.touch_airport(code);
        Some(updated)
    }

    // -----------------------------------------------------------------------
    // Flights
    // -----------------------------------------------------------------------

    pub fn flight(&self, id: &FlightId) -> Option<Flight> {
        self.lock().flights.get(id).cloned()
    }

    pub fn flights(&self) -> Vec<Flight> {
        self.lock().flights.values().cloned().collect()
    }

    /// Insert or overwrite a flight and keep the airport relationship sets in
    /// step: a changed origin or destination is unlinked from the old airport.
    /// Endpoints that are not in the store are left unlinked.
    pub fn upsert_flight(&self, flight: Flight) -> Option<Flight> {
        let mut set = self.lock();
        let previous = set.flights.insert(flight.id.clone(), flight.clone());
        set.dirty_flights.insert(flight.id.clone());

        if let Some(prev) = &previous {
            if prev.origin != flight.origin {
                if let Some(old) = set.airports.get_mut(&prev.origin) {
                    old.flights_from.remove(&flight.id);
                }
                set.touch_airport(&prev.origin);
            }
            if prev.destination != flight.destination {
                if let Some(old) = set.airports.get_mut(&prev.destination) {
                    old.flights_to.remove(&flight.id);
                }
                set.touch_airport(&prev.destination);
            }
        }

        let linked_from = set
            .airports
            .get_mut(&flight.origin)
            .is_some_and(|a| a.flights_from.insert(flight.id.clone()));
        if linked_from {
            set.touch_airport(&flight.origin);
        }
        let linked_to = set
            .airports
            .get_mut(&flight.destination)
            .is_some_and(|a| a.flights_to.insert(flight.id.clone()));
        if linked_to {
            set.touch_airport(&flight.destination);
        }
        previous
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    pub fn has_changes(&self) -> bool {
        let set = self.lock();
        !set.dirty_airports.is_empty() || !set.dirty_flights.is_empty()
    }

    /// Open a commit scope, waiting for any scope already open.
    ///
    /// Must not be called again (or [`commit`](Self::commit)) on the same
    /// thread while the scope is alive.
    pub fn begin(&self) -> CommitScope<'_> {
        CommitScope {
            store: self,
            _gate: self.commit_gate.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Write every dirty record to the backend. Returns how many were written.
    ///
    /// Blocks while another caller holds a [`CommitScope`].
    pub fn commit(&self) -> Result<usize> {
        self.begin().commit()
    }

    fn write_dirty(&self) -> Result<usize> {
        let mut set = self.lock();
        let changes = ChangeSet {
            airports: set
                .dirty_airports
                .iter()
                .filter_map(|code| set.airports.get(code).cloned())
                .collect(),
            flights: set
                .dirty_flights
                .iter()
                .filter_map(|id| set.flights.get(id).cloned())
                .collect(),
        };
        if changes.is_empty() {
            return Ok(0);
        }
        self.backend.write(&changes)?;
        set.dirty_airports.clear();
        set.dirty_flights.clear();
        debug!(records = changes.len(), "store committed");
        Ok(changes.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
