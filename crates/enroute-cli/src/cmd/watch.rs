use crate::output::or_dash;
use crate::session::Session;
use enroute_core::{AirportCode, EntityChange};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Poll incoming flights for `codes[0]` until Ctrl-C.
///
/// With `switch_every`, activation rotates through `codes` on that period;
/// each switch replaces the running poll.
pub fn run(
    root: &Path,
    codes: &[String],
    switch_every: Option<u64>,
    ephemeral: bool,
    json: bool,
) -> anyhow::Result<()> {
    let codes = codes
        .iter()
        .map(|c| AirportCode::new(c))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(first) = codes.first().cloned() else {
        anyhow::bail!("at least one airport code is required");
    };

    let session = Session::open(root, ephemeral)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let controller = &session.controller;
        let store = session.registry.store().clone();
        let mut changes = session.registry.notifier().subscribe();

        controller.activate_code(&first);
        println!(
            "Watching flights into {first} every {}s (Ctrl-C to stop)",
            session.config.poll.interval_secs
        );

        let mut next = 1usize;
        let period = Duration::from_secs(switch_every.unwrap_or(0).max(1));
        let mut switcher = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let rotating = switch_every.is_some() && codes.len() > 1;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = switcher.tick(), if rotating => {
                    let code = &codes[next % codes.len()];
                    next += 1;
                    info!(code = %code, "switching watched airport");
                    controller.activate_code(code);
                }
                change = changes.recv() => match change {
                    Ok(change) => report(&store, &change, json),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "change feed lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        controller.stop();
    });

    if let Err(e) = session.registry.store().commit() {
        warn!(error = %e, "final commit failed");
    }
    Ok(())
}

fn report(store: &enroute_core::Store, change: &EntityChange, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(change) {
            println!("{line}");
        }
        return;
    }
    match change {
        EntityChange::Airport { code } => {
            if let Some(airport) = store.airport(code) {
                println!("airport  {code}  {}", airport.friendly_name());
            }
        }
        EntityChange::Flight { id } => {
            if let Some(flight) = store.flight(id) {
                println!(
                    "flight   {:<10} {} -> {}  {}  eta {}",
                    flight.ident,
                    flight.origin,
                    flight.destination,
                    or_dash(flight.aircraft_type.as_deref()),
                    or_dash(flight.estimated_arrival.map(|t| t.format("%H:%MZ")))
                );
            }
        }
    }
}
