//! `enroute-core` — airport and flight synchronization between a remote
//! flight-data provider and a local store.
//!
//! # Architecture
//!
//! ```text
//! AirportRegistry        ← look-up-or-create by code, metadata merge
//!     │  miss → one background AirportInfoSource fetch → merge_info
//!     ▼
//! Store ── Backend       ← working set + atomic commit (redb / memory)
//!     ▲
//!     │  flight::update per record, one commit per batch
//! FlightSyncController   ← exactly one live RemoteFlightPoller
//!                          generation-fenced against stale batches
//! ```
//!
//! Merges and batch applications fan out through [`ChangeNotifier`].

pub mod airport;
pub mod config;
pub mod error;
pub mod flight;
pub mod io;
pub mod notify;
pub mod paths;
pub mod registry;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

pub use airport::Airport;
pub use error::{EnrouteError, Result};
pub use flight::Flight;
pub use notify::{ChangeNotifier, EntityChange};
pub use registry::{AirportRegistry, MergeOutcome};
pub use store::Store;
pub use sync::{BatchOutcome, FlightSyncController};
pub use types::{AirportCode, AirportInfo, FlightId, FlightRecord};
