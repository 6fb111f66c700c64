use anyhow::Context;
use chrono::Duration;
use safar_core::{SharedClock, SystemClock};
use safar_expiry::{CitySelectionStore, ExpiringEntity, ReturnRouteStore, SignedRoute};
use safar_flow::{FlowOrchestrator, FlowSession};
use safar_seating::{SeatSelectionRecord, SEAT_SELECTION_KEY};
use safar_session::telemetry::init_tracing;
use safar_shared::City;
use safar_store::app_config::Config;
use safar_store::PersistenceLayer;
use serde_json::json;
use std::sync::Arc;

/// Prints what the session engine would restore. Session records are never
/// written; connecting may still create the database file and apply
/// migrations, as any session start would.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load().context("Failed to load config")?;
    let flow = std::env::args().nth(1).unwrap_or_else(|| "booking".to_string());

    let clock: SharedClock = Arc::new(SystemClock);
    let layer = PersistenceLayer::connect(&config.persistence, clock).await;
    tracing::info!(
        namespace = %config.persistence.namespace,
        tiers = ?layer.tier_names(),
        flow = %flow,
        "Inspecting persisted session"
    );

    let seats = layer.load::<SeatSelectionRecord>(SEAT_SELECTION_KEY).await;
    let (origin_kind, destination_kind) = CitySelectionStore::kinds(Duration::zero());
    let origin = layer.load::<ExpiringEntity<City>>(&origin_kind.primary_key()).await;
    let destination = layer.load::<ExpiringEntity<City>>(&destination_kind.primary_key()).await;
    let route = layer
        .load::<ExpiringEntity<SignedRoute>>(&ReturnRouteStore::kind(Duration::zero()).primary_key())
        .await;
    let session = layer.load::<FlowSession>(&FlowOrchestrator::session_key(&flow)).await;

    // the credential stays out of the report
    let seats = seats.map(|record| {
        json!({
            "ticketId": record.ticket_id,
            "hasToken": record.token.is_some(),
            "selectedSeats": record.selected_seats,
            "lastUpdated": record.last_updated,
        })
    });

    let report = json!({
        "tiers": layer.tier_names(),
        "seatSelection": seats,
        "originCity": origin,
        "destinationCity": destination,
        "returnRoute": route,
        "flowSession": session,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
