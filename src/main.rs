use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edu_news_radar::config::Config;
use edu_news_radar::db::ResultStore;
use edu_news_radar::pipeline::{run_forever, Pipeline};
use edu_news_radar::window::TimeWindow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edu_news_radar=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("EDU_NEWS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} feeds from {} ({}h window)",
        config.feeds.len(),
        config_path,
        config.hours_window
    );

    // Initialize result store
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:edu_news.db?mode=rwc".to_string());
    let store = ResultStore::new(
        &database_url,
        config.snapshot_path.clone(),
        TimeWindow::from_hours(config.hours_window),
    )
    .await?;
    store.initialize().await?;
    info!("Result store initialized");

    let pipeline = Pipeline::from_config(&config, store)?;

    if config.refresh_interval == 0 {
        let report = pipeline.run().await?;
        info!(
            "Run finished: {} items kept, {} newly scored",
            report.kept, report.scored
        );
        return Ok(());
    }

    info!(
        "Running every {} minutes",
        config.refresh_interval
    );
    run_forever(Arc::new(pipeline), config.refresh_interval).await;

    Ok(())
}
