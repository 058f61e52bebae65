use crate::output::{or_dash, print_json, print_table};
use crate::session::Session;
use anyhow::Context;
use enroute_core::{Airport, AirportCode, EntityChange};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

// ---------------------------------------------------------------------------
// airport <CODE>
// ---------------------------------------------------------------------------

pub fn show(
    root: &Path,
    code: &str,
    wait_secs: u64,
    refresh: bool,
    ephemeral: bool,
    json: bool,
) -> anyhow::Result<()> {
    let code = AirportCode::new(code)?;
    let session = Session::open(root, ephemeral)?;
    let rt = tokio::runtime::Runtime::new()?;

    let airport = rt.block_on(async {
        let registry = &session.registry;
        if refresh {
            return registry
                .refresh(&code)
                .await
                .with_context(|| format!("failed to refresh {code}"));
        }

        let mut changes = registry.notifier().subscribe();
        let airport = registry.get_or_create(&code);
        if !airport.is_stub() || wait_secs == 0 {
            return Ok(airport);
        }

        let merged = tokio::time::timeout(Duration::from_secs(wait_secs), async {
            loop {
                match changes.recv().await {
                    Ok(EntityChange::Airport { code: changed }) if changed == code => break,
                    Err(RecvError::Closed) => break,
                    _ => {}
                }
            }
        })
        .await;
        if merged.is_err() {
            warn!(code = %code, "no metadata within {wait_secs}s");
        }
        Ok(registry.store().airport(&code).unwrap_or(airport))
    })?;

    // Persist the stub even if metadata never arrived.
    if let Err(e) = session.registry.store().commit() {
        warn!(error = %e, "could not persist airport");
    }

    if json {
        return print_json(&airport);
    }
    print_airport(&airport);
    if airport.is_stub() {
        println!("(metadata incomplete; re-run with --refresh to fetch it again)");
    }
    Ok(())
}

fn print_airport(airport: &Airport) {
    println!("Airport:   {}", airport.code);
    println!("Name:      {}", airport.friendly_name());
    println!("Location:  {}", or_dash(airport.location.as_deref()));
    println!("Timezone:  {}", or_dash(airport.timezone.as_deref()));
    println!(
        "Position:  {}, {}",
        or_dash(airport.latitude),
        or_dash(airport.longitude)
    );
    println!(
        "Flights:   {} inbound, {} outbound",
        airport.flights_to.len(),
        airport.flights_from.len()
    );
}

// ---------------------------------------------------------------------------
// airports
// ---------------------------------------------------------------------------

pub fn list(root: &Path, ephemeral: bool, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root, ephemeral)?;
    let airports = session.registry.list_sorted();

    if json {
        return print_json(&airports);
    }
    if airports.is_empty() {
        println!("No airports stored yet. Try `enroute airport <CODE>`.");
        return Ok(());
    }

    let rows = airports
        .iter()
        .map(|a| {
            vec![
                a.code.to_string(),
                a.friendly_name(),
                or_dash(a.timezone.as_deref()),
                a.flights_to.len().to_string(),
                a.flights_from.len().to_string(),
            ]
        })
        .collect();
    print_table(&["CODE", "NAME", "TIMEZONE", "IN", "OUT"], rows);
    Ok(())
}
