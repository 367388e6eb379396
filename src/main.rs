//! Wiring & DI. Entry point: bootstrap the store, inject into the pipeline,
//! run once or on a schedule. No business logic here.

use copool::adapters::persistence::SqliteStore;
use copool::ports::{StorePort, TriggerPort};
use copool::shared::config::AppConfig;
use copool::usecases::{
    CombinationGenerator, DispatchConfig, PipelineService, RequestAggregator, Scheduler,
    TripDispatcher,
};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().unwrap_or_default();

    let data_dir = PathBuf::from(cfg.data_dir_or_default());
    let store = Arc::new(
        SqliteStore::connect(&data_dir)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    let store: Arc<dyn StorePort> = store;

    let dispatch_cfg = DispatchConfig {
        max_distance_km: cfg.max_distance_km_or_default(),
        max_duration_min: cfg.max_duration_min_or_default(),
        min_passengers: cfg.min_passengers_or_default(),
        strategy: cfg.dispatch_strategy_or_default(),
    };
    info!(
        max_distance_km = dispatch_cfg.max_distance_km,
        max_duration_min = dispatch_cfg.max_duration_min,
        min_passengers = dispatch_cfg.min_passengers,
        strategy = ?dispatch_cfg.strategy,
        "dispatch configuration"
    );

    let pipeline: Arc<dyn TriggerPort> = Arc::new(PipelineService::new(
        Arc::clone(&store),
        RequestAggregator::new(Arc::clone(&store)),
        CombinationGenerator::new(Arc::clone(&store), cfg.max_group_size_or_default()),
        TripDispatcher::new(Arc::clone(&store), dispatch_cfg),
    ));

    // `copool watch` runs the periodic scheduler until Ctrl-C;
    // bare `copool` runs one batch and exits.
    let watch_mode = std::env::args().nth(1).is_some_and(|a| a == "watch");
    if watch_mode {
        let cycle = Duration::from_secs(cfg.cycle_minutes_or_default() * 60);
        info!(cycle_minutes = cfg.cycle_minutes_or_default(), "watch mode");
        let scheduler = Scheduler::start(Arc::clone(&pipeline), cycle);
        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, stopping scheduler");
        scheduler.stop().await;
    } else {
        let summary = pipeline
            .run_pipeline()
            .await
            .map_err(|e| anyhow::anyhow!("pipeline run failed: {}", e))?;
        info!(
            groups = summary.groups_formed,
            proposals = summary.proposals_generated,
            offers = summary.offers_created,
            reset = summary.requests_reset,
            "batch complete"
        );
    }

    Ok(())
}
