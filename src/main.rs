//! pool-observer entry point.
//!
//! Provisions the configured pools, starts one scrape loop per pool, the
//! optional remote sync and retention tasks, and serves the viewer API
//! until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use pool_observer::api;
use pool_observer::app_state::AppState;
use pool_observer::config::ObserverConfig;
use pool_observer::domain::EventBus;
use pool_observer::fetch::HttpPageFetcher;
use pool_observer::logging::setup_logging;
use pool_observer::persistence::SqliteStore;
use pool_observer::pipeline::CycleRunner;
use pool_observer::service::{PoolLocks, Scheduler, provision_pools, spawn_retention};
use pool_observer::sync::{PostgrestSink, RemoteSync};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ObserverConfig::from_env().context("loading configuration")?;
    setup_logging(&config.log_level, config.log_json)?;
    tracing::info!(
        database = %config.database_url,
        api = config.api_enabled,
        sync = config.sync.is_some(),
        "starting pool-observer"
    );

    let pools = config.load_pools().context("loading pools")?;

    let store = SqliteStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("opening database")?;
    let created = provision_pools(&store, &pools).await?;
    tracing::info!(configured = pools.len(), created, "pools ready");

    let events = EventBus::new(config.event_bus_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // subscribe before the first cycle can publish
    let sync_task = match &config.sync {
        Some(sync_config) => {
            let sink = Arc::new(PostgrestSink::new(sync_config)?);
            let sync = RemoteSync::new(sink, store.clone(), sync_config);
            Some(tokio::spawn(sync.run(events.subscribe(), shutdown_rx.clone())))
        }
        None => None,
    };

    let fetcher = Arc::new(HttpPageFetcher::new(config.fetch_timeout())?);
    let runner = CycleRunner::new(
        fetcher,
        store.clone(),
        Arc::new(PoolLocks::new()),
        events.clone(),
        config.fetch_timeout(),
        config.fetch_retry_delay(),
    );
    let scheduler = Scheduler::new(runner, config.scrape_interval());
    let mut scrape_tasks = scheduler.spawn(pools, shutdown_rx.clone());

    let retention_task = (config.retention_days > 0)
        .then(|| spawn_retention(store.clone(), config.retention_days, shutdown_rx.clone()));

    if config.api_enabled {
        let app = Router::new()
            .merge(api::build_router())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(AppState::new(store.clone()));

        let listener = tokio::net::TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("binding {}", config.listen_addr))?;
        tracing::info!(addr = %config.listen_addr, "server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    while let Some(joined) = scrape_tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "scrape loop panicked");
        }
    }
    for task in [sync_task, retention_task].into_iter().flatten() {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
