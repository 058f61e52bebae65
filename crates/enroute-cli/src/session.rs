use anyhow::Context;
use enroute_core::config::Config;
use enroute_core::remote::{HttpProvider, RemoteFlightPoller};
use enroute_core::store::{Backend, MemoryBackend, RedbBackend, Store};
use enroute_core::{AirportRegistry, ChangeNotifier, FlightSyncController};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, wired from the project config.
pub struct Session {
    pub config: Config,
    pub registry: AirportRegistry,
    pub controller: FlightSyncController,
}

impl Session {
    /// Build the store, provider, registry and controller for `root`.
    ///
    /// `ephemeral` swaps the redb file for an in-memory backend.
    pub fn open(root: &Path, ephemeral: bool) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;

        let backend: Arc<dyn Backend> = if ephemeral {
            Arc::new(MemoryBackend::new())
        } else {
            let path = config.store_path(root);
            Arc::new(
                RedbBackend::open(&path)
                    .with_context(|| format!("failed to open store at {}", path.display()))?,
            )
        };
        let store = Arc::new(Store::open(backend).context("failed to load store")?);

        let provider = Arc::new(
            HttpProvider::new(
                &config.provider.base_url,
                config.provider.api_key(),
                config.provider.fetch_timeout(),
            )
            .context("failed to build provider client")?,
        );

        let registry = AirportRegistry::new(
            store,
            provider.clone(),
            Arc::new(ChangeNotifier::new()),
            config.provider.fetch_timeout(),
        );
        let poller = RemoteFlightPoller::new(
            provider,
            config.poll.limit,
            config.poll.interval(),
            config.provider.fetch_timeout(),
        );
        let controller = FlightSyncController::new(registry.clone(), poller);

        Ok(Self {
            config,
            registry,
            controller,
        })
    }
}
