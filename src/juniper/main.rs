// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Juniper keeps the traffic event table current: it polls due feed sources and
//! retires events whose window has closed, once per tick.

use chrono::Utc;
use detour::postgres_tools::make_async_pool;
use detour::settings::Settings;
use detour::traffic_events::TrafficEventStore;
use detour::traffic_events::postgres::PgTrafficEventStore;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let settings = Settings::from_env();

    info!("Connecting to database...");
    let pool = Arc::new(make_async_pool().await.map_err(|e| anyhow::anyhow!(e))?);

    let ingestion = settings.feed_ingestion_service(pool.clone())?;
    let events = PgTrafficEventStore::new(pool);

    let mut interval = tokio::time::interval(settings.juniper_tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(tick_seconds = settings.juniper_tick.as_secs(), "juniper started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();

                let reports = ingestion.poll_due_sources(now).await;
                if !reports.is_empty() {
                    let failed = reports.iter().filter(|r| !r.succeeded()).count();
                    info!(polled = reports.len(), failed, "feed cycle finished");
                }

                match events.deactivate_expired(now).await {
                    Ok(0) => {}
                    Ok(flipped) => info!(flipped, "expired traffic events deactivated"),
                    Err(e) => error!(error = %e, "could not deactivate expired traffic events"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
