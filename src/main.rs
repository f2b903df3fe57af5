use std::str::FromStr;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use walletwatch_scorer::config::Config;
use walletwatch_scorer::pipeline::{FraudPipeline, PipelineMode};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("WalletWatch Scorer starting");

    // Usage: walletwatch-scorer [mode] [config-path]
    let mode = std::env::args()
        .nth(1)
        .map(|arg| PipelineMode::from_str(&arg))
        .transpose()?
        .unwrap_or(PipelineMode::Full);
    let config_path = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        mode = mode.as_str(),
        model_kind = config.model.kind.as_str(),
        "Configuration loaded from {}",
        config_path
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    let pipeline = FraudPipeline::new(config);
    let summary = pipeline.run(&pool, mode).await?;

    tracing::info!(
        feature_rows = summary.feature_rows,
        scored_rows = summary.scored_rows,
        high_risk_wallets = summary.high_risk_wallets,
        "WalletWatch Scorer finished"
    );
    Ok(())
}
