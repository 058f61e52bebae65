use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::types::{AirportCode, FlightRecord};

use super::FlightSource;

/// Repeats a [`FlightSource`] fetch for one airport on a fixed interval.
#[derive(Clone)]
pub struct RemoteFlightPoller {
    source: Arc<dyn FlightSource>,
    limit: usize,
    interval: Duration,
    fetch_timeout: Duration,
}

impl RemoteFlightPoller {
    pub fn new(
        source: Arc<dyn FlightSource>,
        limit: usize,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            limit,
            // tokio's interval panics on a zero period
            interval: interval.max(Duration::from_millis(1)),
            fetch_timeout,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `code`. The first fetch runs immediately, then once per
    /// interval. Failed or timed-out fetches deliver nothing and the next
    /// tick tries again.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, code: AirportCode) -> (PollSubscription, PollResults) {
        let (tx, rx) = mpsc::channel(8);
        let source = self.source.clone();
        let limit = self.limit;
        let period = self.interval;
        let fetch_timeout = self.fetch_timeout;
        let task_code = code.clone();

        let handle = tokio::spawn(async move {
            let code = task_code;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tokio::time::timeout(fetch_timeout, source.fetch_flights(&code, limit)).await
                {
                    Ok(Ok(batch)) => {
                        debug!(code = %code, flights = batch.len(), "poll batch fetched");
                        if tx.send(batch).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(code = %code, error = %e, "flight poll failed; retrying next tick");
                    }
                    Err(_) => {
                        warn!(code = %code, timeout = ?fetch_timeout, "flight poll timed out");
                    }
                }
            }
        });

        (PollSubscription { code, handle }, PollResults { rx })
    }
}

/// Handle to a running poll loop. Stopping (or dropping) it aborts the loop,
/// including a fetch that is still in flight.
pub struct PollSubscription {
    code: AirportCode,
    handle: JoinHandle<()>,
}

impl PollSubscription {
    pub fn code(&self) -> &AirportCode {
        &self.code
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Result stream of a poll loop. Yields `None` once the loop is gone.
pub struct PollResults {
    rx: mpsc::Receiver<Vec<FlightRecord>>,
}

impl PollResults {
    pub async fn recv(&mut self) -> Option<Vec<FlightRecord>> {
        self.rx.recv().await
    }
}
