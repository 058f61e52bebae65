//! Remote flight-data provider seams.
//!
//! ```text
//! AirportInfoSource  ← one-shot metadata fetch per airport code
//! FlightSource       ← one batch of flights for an airport code
//!     │
//!     ▼
//! RemoteFlightPoller ← repeats FlightSource on an interval until stopped
//! ```
//!
//! [`HttpProvider`] implements both sources over HTTP.

pub mod http;
pub mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpProvider;
pub use poller::{PollSubscription, RemoteFlightPoller};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AirportCode, AirportInfo, FlightRecord};

#[async_trait]
pub trait AirportInfoSource: Send + Sync {
    async fn fetch_airport_info(&self, code: &AirportCode) -> Result<AirportInfo>;
}

#[async_trait]
pub trait FlightSource: Send + Sync {
    /// Fetch at most `limit` flights currently bound for `code`.
    async fn fetch_flights(&self, code: &AirportCode, limit: usize) -> Result<Vec<FlightRecord>>;
}
