//! Single-subscription flight polling.
//!
//! # States
//!
//! ```text
//!            activate(a)                activate(b)
//!   Idle ───────────────▶ Polling(a) ───────────────▶ Polling(b)
//!    ▲                        │
//!    └──────── stop() ────────┘
//! ```
//!
//! Every `activate` and `stop` bumps the poll generation under the state
//! lock. Batch application checks the generation and stages the batch under
//! the same lock, so once either call returns, nothing delivered by an older
//! subscription can be staged. Each batch is staged inside a store commit
//! scope and written by exactly one commit.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::airport::Airport;
use crate::flight;
use crate::notify::EntityChange;
use crate::registry::AirportRegistry;
use crate::remote::{PollSubscription, RemoteFlightPoller};
use crate::types::{AirportCode, FlightId, FlightRecord};

/// What happened to one delivered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Records merged; `committed` is false if persisting failed.
    Applied {
        flights: Vec<FlightId>,
        committed: bool,
    },
    /// Delivered by a superseded subscription and dropped.
    Stale,
}

struct ActivePoll {
    airport: AirportCode,
    subscription: PollSubscription,
    consumer: JoinHandle<()>,
}

impl ActivePoll {
    fn cancel(self) {
        self.subscription.stop();
        self.consumer.abort();
    }
}

#[derive(Default)]
struct PollState {
    generation: u64,
    active: Option<ActivePoll>,
}

struct Inner {
    registry: AirportRegistry,
    state: Mutex<PollState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stage `batch` and commit it as one unit.
    ///
    /// The generation check and the staging run under the state lock; the
    /// backend write runs after the lock is released but before the commit
    /// scope closes. Blocks on the backend, so async callers go through
    /// `spawn_blocking`.
    fn apply_batch(&self, generation: u64, batch: Vec<FlightRecord>) -> BatchOutcome {
        let store = self.registry.store();
        let scope = store.begin();

        let flights: Vec<FlightId> = {
            let state = self.lock();
            if state.generation != generation {
                debug!(
                    generation,
                    current = state.generation,
                    records = batch.len(),
                    "discarding stale poll batch"
                );
                return BatchOutcome::Stale;
            }
            batch
                .iter()
                .filter_map(|record| flight::update(record, &self.registry))
                .collect()
        };

        let committed = match scope.commit() {
            Ok(written) => {
                debug!(generation, flights = flights.len(), written, "poll batch committed");
                true
            }
            Err(e) => {
                warn!(generation, error = %e, "could not persist flight batch");
                false
            }
        };

        // Observers run outside both locks so they may call back in.
        let notifier = self.registry.notifier();
        for id in &flights {
            notifier.notify(EntityChange::Flight { id: id.clone() });
        }
        BatchOutcome::Applied { flights, committed }
    }
}

/// Owns at most one live poll subscription.
///
/// Create one per application and pass it around by reference; independent
/// controllers do not share state.
pub struct FlightSyncController {
    inner: Arc<Inner>,
    poller: RemoteFlightPoller,
}

impl FlightSyncController {
    pub fn new(registry: AirportRegistry, poller: RemoteFlightPoller) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                state: Mutex::new(PollState::default()),
            }),
            poller,
        }
    }

    /// Replace any running poll with a new one targeting `airport`.
    ///
    /// Re-activating the airport that is already polled still tears the old
    /// subscription down and starts over. Returns the new generation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self, airport: &Airport) -> u64 {
        let mut state = self.inner.lock();
        if let Some(previous) = state.active.take() {
            info!(code = %previous.airport, "stopping previous flight poll");
            previous.cancel();
        }
        state.generation += 1;
        let generation = state.generation;

        let (subscription, mut results) = self.poller.start(airport.code.clone());
        let inner = self.inner.clone();
        let consumer = tokio::spawn(async move {
            while let Some(batch) = results.recv().await {
                let inner = inner.clone();
                match tokio::task::spawn_blocking(move || inner.apply_batch(generation, batch))
                    .await
                {
                    Ok(BatchOutcome::Stale) => break,
                    Ok(BatchOutcome::Applied { .. }) => {}
                    Err(e) => warn!(generation, error = %e, "poll batch task failed"),
                }
            }
        });

        info!(
            code = %airport.code,
            generation,
            limit = self.poller.limit(),
            interval = ?self.poller.interval(),
            "flight poll started"
        );
        state.active = Some(ActivePoll {
            airport: airport.code.clone(),
            subscription,
            consumer,
        });
        generation
    }

    /// Resolve `code` through the registry and activate polling for it.
    pub fn activate_code(&self, code: &AirportCode) -> Airport {
        let airport = self.inner.registry.get_or_create(code);
        self.activate(&airport);
        airport
    }

    /// Stop polling and return to idle.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        if let Some(previous) = state.active.take() {
            info!(code = %previous.airport, "flight poll stopped");
            previous.cancel();
        }
    }

    /// The airport currently polled, if any.
    pub fn active_airport(&self) -> Option<AirportCode> {
        self.inner.lock().active.as_ref().map(|a| a.airport.clone())
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn registry(&self) -> &AirportRegistry {
        &self.inner.registry
    }
}

impl Drop for FlightSyncController {
    fn drop(&mut self) {
        if let Some(previous) = self.inner.lock().active.take() {
            previous.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChangeNotifier;
    use crate::remote::testing::{flight_record, ScriptedFlightSource, StaticInfoSource};
    use crate::store::{MemoryBackend, Store};
    use crate::types::AirportInfo;
    use std::time::Duration;

    fn code(s: &str) -> AirportCode {
        AirportCode::new(s).unwrap()
    }

    struct Fixture {
        backend: Arc<MemoryBackend>,
        info: Arc<StaticInfoSource>,
        source: Arc<ScriptedFlightSource>,
        controller: FlightSyncController,
    }

    fn fixture(interval: Duration) -> Fixture {
        fixture_with_info(interval, vec![])
    }

    fn fixture_with_info(interval: Duration, infos: Vec<AirportInfo>) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(Store::open(backend.clone()).unwrap());
        let info = Arc::new(StaticInfoSource::with(infos));
        let registry = AirportRegistry::new(
            store,
            info.clone(),
            Arc::new(ChangeNotifier::new()),
            Duration::from_secs(1),
        );
        let source = Arc::new(ScriptedFlightSource::new());
        source.set_batch(&code("KSFO"), vec![flight_record("SFO1", "KLAX", "KSFO")]);
        source.set_batch(&code("KJFK"), vec![flight_record("JFK1", "KBOS", "KJFK")]);
        let poller = RemoteFlightPoller::new(source.clone(), 120, interval, Duration::from_secs(1));
        Fixture {
            backend,
            info,
            source,
            controller: FlightSyncController::new(registry, poller),
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn flights_into(controller: &FlightSyncController, dest: &str) -> usize {
        controller
            .registry()
            .store()
            .flights()
            .iter()
            .filter(|f| f.destination.as_str() == dest)
            .count()
    }

    /// Activate `code` and return the generation the new poll runs under.
    fn activate(controller: &FlightSyncController, c: &str) -> u64 {
        controller.activate_code(&code(c));
        controller.generation()
    }

    #[test]
    fn new_controller_is_idle() {
        let fx = fixture(Duration::from_secs(10));
        assert!(fx.controller.active_airport().is_none());
        assert_eq!(fx.controller.generation(), 0);
    }

    #[tokio::test]
    async fn activate_polls_and_merges_batches() {
        let fx = fixture(Duration::from_millis(20));
        let sfo = fx.controller.registry().get_or_create(&code("KSFO"));
        assert_eq!(fx.controller.activate(&sfo), 1);
        assert_eq!(fx.controller.active_airport(), Some(code("KSFO")));

        let c = &fx.controller;
        wait_until(|| flights_into(c, "KSFO") == 1).await;
        let store = c.registry().store();
        let airport = store.airport(&code("KSFO")).unwrap();
        assert!(airport.flights_to.contains(&FlightId::new("SFO1")));
        assert!(store.airport(&code("KLAX")).is_some());
        assert_eq!(fx.source.last_limit(), Some(120));
    }

    #[tokio::test]
    async fn switching_airports_leaves_one_subscription_on_the_new_target() {
        let fx = fixture(Duration::from_millis(20));
        fx.controller.activate_code(&code("KSFO"));
        fx.controller.activate_code(&code("KJFK"));
        assert_eq!(fx.controller.active_airport(), Some(code("KJFK")));
        assert_eq!(fx.controller.generation(), 2);

        let c = &fx.controller;
        wait_until(|| flights_into(c, "KJFK") == 1).await;
        let sfo_calls = fx.source.calls_for(&code("KSFO"));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(flights_into(c, "KSFO"), 0);
        assert_eq!(fx.source.calls_for(&code("KSFO")), sfo_calls);
        assert!(fx.source.calls_for(&code("KJFK")) >= 2);
    }

    #[tokio::test]
    async fn fetch_in_flight_at_switch_time_never_lands() {
        let fx = fixture(Duration::from_millis(20));
        fx.source.hold(&code("KSFO"));
        fx.controller.activate_code(&code("KSFO"));

        let source = fx.source.clone();
        wait_until(|| source.calls_for(&code("KSFO")) == 1).await;
        let sfo_before = fx
            .controller
            .registry()
            .store()
            .airport(&code("KSFO"))
            .unwrap()
            .flights_to;

        fx.controller.activate_code(&code("KJFK"));
        fx.source.release();

        let c = &fx.controller;
        wait_until(|| flights_into(c, "KJFK") == 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let store = c.registry().store();
        assert!(store.flight(&FlightId::new("SFO1")).is_none());
        assert_eq!(flights_into(c, "KSFO"), 0);
        assert_eq!(store.airport(&code("KSFO")).unwrap().flights_to, sfo_before);
        assert_eq!(fx.source.calls_for(&code("KSFO")), 1);
    }

    #[tokio::test]
    async fn late_batch_from_superseded_generation_is_discarded() {
        let fx = fixture(Duration::from_secs(10));
        let sfo_generation = activate(&fx.controller, "KSFO");
        let sfo = fx.controller.registry().get_or_create(&code("KSFO"));
        let sfo_flights_before = sfo.flights_to.len();
        fx.controller.activate_code(&code("KJFK"));

        let outcome = fx.controller.inner.apply_batch(
            sfo_generation,
            vec![flight_record("LATE1", "KLAX", "KSFO")],
        );
        assert_eq!(outcome, BatchOutcome::Stale);

        let store = fx.controller.registry().store();
        assert!(store.flight(&FlightId::new("LATE1")).is_none());
        assert_eq!(
            store.airport(&code("KSFO")).unwrap().flights_to.len(),
            sfo_flights_before
        );
    }

    #[tokio::test]
    async fn batch_applies_in_order_and_commits_once() {
        let fx = fixture(Duration::from_secs(10));
        let generation = activate(&fx.controller, "KJFK");
        let c = &fx.controller;
        wait_until(|| flights_into(c, "KJFK") == 1).await;
        let writes = fx.backend.write_count();

        let outcome = c.inner.apply_batch(
            generation,
            vec![
                flight_record("F1", "KBOS", "KJFK"),
                flight_record("F1", "KBOS", "KEWR"),
                flight_record("F2", "KORD", "KJFK"),
            ],
        );
        match outcome {
            BatchOutcome::Applied { flights, committed } => {
                assert!(committed);
                assert_eq!(flights.len(), 3);
            }
            BatchOutcome::Stale => panic!("current generation must apply"),
        }
        assert_eq!(fx.backend.write_count(), writes + 1);

        let store = c.registry().store();
        assert_eq!(store.flight(&FlightId::new("F1")).unwrap().destination, code("KEWR"));
        assert!(!store
            .airport(&code("KJFK"))
            .unwrap()
            .flights_to
            .contains(&FlightId::new("F1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn metadata_merges_never_write_part_of_a_batch() {
        const RECORDS: usize = 300;
        let origins: Vec<String> = (0..RECORDS).map(|n| format!("X{n:03}")).collect();
        let infos = origins
            .iter()
            .map(|o| AirportInfo {
                code: Some(o.clone()),
                name: Some(format!("{o} Field")),
                ..AirportInfo::default()
            })
            .collect();
        let fx = fixture_with_info(Duration::from_secs(10), infos);
        fx.source.set_batch(&code("KJFK"), vec![]);

        let generation = activate(&fx.controller, "KJFK");
        let batch = origins
            .iter()
            .enumerate()
            .map(|(n, o)| flight_record(&format!("F{n}"), o, "KJFK"))
            .collect();
        let inner = fx.controller.inner.clone();
        let outcome = tokio::task::spawn_blocking(move || inner.apply_batch(generation, batch))
            .await
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::Applied { committed: true, .. }));

        // One fetch per new origin plus the KJFK stub.
        let info = fx.info.clone();
        wait_until(|| info.calls() == RECORDS + 1).await;
        let store = fx.controller.registry().store().clone();
        wait_until(|| store.airports().iter().all(|a| !a.is_stub() || a.code.as_str() == "KJFK"))
            .await;
        wait_until(|| !store.has_changes()).await;

        let partial: Vec<(usize, usize)> = fx
            .backend
            .write_sizes()
            .into_iter()
            .filter(|&(_, flights)| flights != 0 && flights != RECORDS)
            .collect();
        assert!(partial.is_empty(), "partial batch writes: {partial:?}");
        assert_eq!(fx.backend.flight_count(), RECORDS);
    }

    #[tokio::test]
    async fn commit_failure_does_not_stop_polling() {
        let fx = fixture(Duration::from_millis(15));
        fx.backend.fail_commits(true);
        fx.controller.activate_code(&code("KSFO"));

        let source = fx.source.clone();
        wait_until(|| source.calls_for(&code("KSFO")) >= 3).await;
        assert_eq!(flights_into(&fx.controller, "KSFO"), 1);
        assert_eq!(fx.backend.flight_count(), 0);

        fx.backend.fail_commits(false);
        let backend = fx.backend.clone();
        wait_until(|| backend.flight_count() == 1).await;
    }

    #[tokio::test]
    async fn reactivating_same_airport_restarts_subscription() {
        let fx = fixture(Duration::from_secs(10));
        let sfo = fx.controller.registry().get_or_create(&code("KSFO"));
        let first = fx.controller.activate(&sfo);
        let second = fx.controller.activate(&sfo);
        assert_eq!(second, first + 1);
        assert_eq!(fx.controller.active_airport(), Some(code("KSFO")));
        assert_eq!(
            fx.controller.inner.apply_batch(first, vec![]),
            BatchOutcome::Stale
        );
    }

    #[tokio::test]
    async fn stop_returns_to_idle_and_fences_results() {
        let fx = fixture(Duration::from_secs(10));
        let generation = activate(&fx.controller, "KSFO");
        fx.controller.stop();
        assert!(fx.controller.active_airport().is_none());
        assert_eq!(
            fx.controller
                .inner
                .apply_batch(generation, vec![flight_record("X", "KLAX", "KSFO")]),
            BatchOutcome::Stale
        );
    }

    #[tokio::test]
    async fn applied_flights_are_notified() {
        let fx = fixture(Duration::from_secs(10));
        let mut rx = fx.controller.registry().notifier().subscribe();
        fx.controller.activate_code(&code("KJFK"));
        let change = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(EntityChange::Flight { id }) = rx.recv().await {
                    return id;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(change, FlightId::new("JFK1"));
    }
}
