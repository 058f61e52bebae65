//! In-process sources for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{EnrouteError, Result};
use crate::types::{AirportCode, AirportInfo, FlightRecord};

use super::{AirportInfoSource, FlightSource};

pub(crate) fn flight_record(id: &str, origin: &str, destination: &str) -> FlightRecord {
    FlightRecord {
        id: id.to_string(),
        ident: id.to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        filed_departure: None,
        actual_departure: None,
        estimated_arrival: None,
        actual_arrival: None,
        aircraft_type: None,
    }
}

/// Answers from a fixed table; unknown codes are a transport error.
#[derive(Default)]
pub(crate) struct StaticInfoSource {
    infos: Mutex<HashMap<AirportCode, AirportInfo>>,
    calls: AtomicUsize,
}

impl StaticInfoSource {
    pub(crate) fn with(infos: Vec<AirportInfo>) -> Self {
        let source = Self::default();
        {
            let mut map = source.infos.lock().unwrap();
            for info in infos {
                if let Some(code) = info.airport_code() {
                    map.insert(code, info);
                }
            }
        }
        source
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AirportInfoSource for StaticInfoSource {
    async fn fetch_airport_info(&self, code: &AirportCode) -> Result<AirportInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.infos
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| EnrouteError::Transport(format!("no info for {code}")))
    }
}

/// Returns the batch configured for each code (empty by default).
///
/// Fetches for a held code park until [`release`](Self::release).
#[derive(Default)]
pub(crate) struct ScriptedFlightSource {
    batches: Mutex<HashMap<AirportCode, Vec<FlightRecord>>>,
    calls: Mutex<HashMap<AirportCode, usize>>,
    last_limit: Mutex<Option<usize>>,
    failures_left: AtomicUsize,
    held: Mutex<HashSet<AirportCode>>,
    released: Notify,
}

impl ScriptedFlightSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_batch(&self, code: &AirportCode, batch: Vec<FlightRecord>) {
        self.batches.lock().unwrap().insert(code.clone(), batch);
    }

    pub(crate) fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub(crate) fn hold(&self, code: &AirportCode) {
        self.held.lock().unwrap().insert(code.clone());
    }

    pub(crate) fn release(&self) {
        self.held.lock().unwrap().clear();
        self.released.notify_waiters();
    }

    pub(crate) fn calls_for(&self, code: &AirportCode) -> usize {
        self.calls.lock().unwrap().get(code).copied().unwrap_or(0)
    }

    pub(crate) fn last_limit(&self) -> Option<usize> {
        *self.last_limit.lock().unwrap()
    }
}

#[async_trait]
impl FlightSource for ScriptedFlightSource {
    async fn fetch_flights(&self, code: &AirportCode, limit: usize) -> Result<Vec<FlightRecord>> {
        *self.calls.lock().unwrap().entry(code.clone()).or_default() += 1;
        *self.last_limit.lock().unwrap() = Some(limit);
        loop {
            let released = self.released.notified();
            if !self.held.lock().unwrap().contains(code) {
                break;
            }
            released.await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EnrouteError::Transport("scripted failure".into()));
        }
        let batch = self
            .batches
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .unwrap_or_default();
        Ok(batch.into_iter().take(limit).collect())
    }
}
