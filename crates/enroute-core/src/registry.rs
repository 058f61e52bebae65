//! Look-up-or-create of airports and metadata merge.
//!
//! A lookup miss stages a stub immediately and schedules one background
//! metadata fetch; the fetch result flows back through [`AirportRegistry::merge_info`].
//! Merges are last-write-wins and commit once each. Commit failures are
//! logged and swallowed: the working set keeps the merged values.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::airport::Airport;
use crate::error::{EnrouteError, Result};
use crate::notify::{ChangeNotifier, EntityChange};
use crate::remote::AirportInfoSource;
use crate::store::Store;
use crate::types::{AirportCode, AirportInfo};

/// What a merge did, for callers that want the commit outcome.
#[derive(Debug)]
pub struct MergeOutcome {
    pub airport: Airport,
    pub committed: Result<()>,
}

#[derive(Clone)]
pub struct AirportRegistry {
    store: Arc<Store>,
    info: Arc<dyn AirportInfoSource>,
    notifier: Arc<ChangeNotifier>,
    fetch_timeout: Duration,
}

impl AirportRegistry {
    pub fn new(
        store: Arc<Store>,
        info: Arc<dyn AirportInfoSource>,
        notifier: Arc<ChangeNotifier>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            info,
            notifier,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Return the airport for `code`, creating a stub on a miss.
    ///
    /// A hit has no side effects. A miss stages the stub and spawns exactly
    /// one metadata fetch; the returned record may still lack metadata.
    pub fn get_or_create(&self, code: &AirportCode) -> Airport {
        let (airport, created) = self
            .store
            .get_or_insert_airport(code, || Airport::stub(code.clone()));
        if created {
            debug!(code = %code, "airport stub created");
            self.spawn_info_fetch(code.clone());
        }
        airport
    }

    fn spawn_info_fetch(&self, code: AirportCode) {
        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(code = %code, "no runtime; metadata fetch skipped");
            return;
        };
        let registry = self.clone();
        handle.spawn(async move {
            match registry.fetch_info(&code).await {
                // The merge commits to the backend, which blocks.
                Ok(info) => {
                    let merged =
                        tokio::task::spawn_blocking(move || registry.merge_info(&info)).await;
                    if let Err(e) = merged {
                        warn!(code = %code, error = %e, "airport metadata merge task failed");
                    }
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "airport metadata fetch failed; stub left incomplete")
                }
            }
        });
    }

    async fn fetch_info(&self, code: &AirportCode) -> Result<AirportInfo> {
        tokio::time::timeout(self.fetch_timeout, self.info.fetch_airport_info(code))
            .await
            .map_err(|_| EnrouteError::Timeout(self.fetch_timeout, format!("airport info {code}")))?
    }

    /// Fetch metadata for `code` now and merge it, bypassing the miss path.
    /// Used to refresh an existing airport or retry an incomplete stub.
    pub async fn refresh(&self, code: &AirportCode) -> Result<Airport> {
        let info = self.fetch_info(code).await?;
        let registry = self.clone();
        tokio::task::spawn_blocking(move || registry.merge_info_reporting(&info))
            .await
            .map_err(|e| EnrouteError::Store(format!("task join error: {e}")))?
            .map(|outcome| outcome.airport)
            .ok_or_else(|| {
                EnrouteError::Transport(format!("provider returned no usable code for {code}"))
            })
    }

    /// Overwrite an airport's metadata from `info`. Malformed info (no code)
    /// is ignored.
    pub fn merge_info(&self, info: &AirportInfo) {
        let _ = self.merge_info_reporting(info);
    }

    /// [`merge_info`](Self::merge_info), returning the merged airport and the
    /// commit result. `None` means the info was malformed and nothing changed.
    ///
    /// Commits synchronously; call it through `spawn_blocking` from async code.
    pub fn merge_info_reporting(&self, info: &AirportInfo) -> Option<MergeOutcome> {
        let Some(code) = info.airport_code() else {
            debug!(code = ?info.code, "ignoring airport info without a usable code");
            return None;
        };

        // Held across staging so the commit cannot pick up a flight batch
        // that is only partly staged.
        let scope = self.store.begin();

        // The info is already in hand, so a miss here creates the stub
        // without scheduling another fetch.
        self.store
            .get_or_insert_airport(&code, || Airport::stub(code.clone()));
        let airport = self
            .store
            .update_airport(&code, |a| a.apply_info(info))?;

        let committed = scope.commit().map(|_| ());
        match &committed {
            Ok(()) => info!(code = %code, name = ?airport.name, "airport metadata merged"),
            Err(e) => warn!(code = %code, error = %e, "could not persist airport metadata"),
        }

        self.notifier.notify(EntityChange::Airport { code: code.clone() });
        for id in airport.related_flights() {
            self.notifier.notify(EntityChange::Flight { id });
        }

        Some(MergeOutcome { airport, committed })
    }

    /// Every stored airport, ordered for display.
    pub fn list_sorted(&self) -> Vec<Airport> {
        let mut airports = self.store.airports();
        airports.sort_by(Airport::cmp_by_location);
        airports
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
