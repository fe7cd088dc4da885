use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use anthranks::models::settings::BotConfig;
use anthranks::services::platform::discord::DiscordClient;
use anthranks::services::platform::ChatPlatform;
use anthranks::services::store::{backoff::RetryPolicy, SheetStore, SheetsClient};
use anthranks::services::{InteractionGateway, ResultsScheduler, RevivalEngine};
use anthranks::state::BotContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BotConfig::from_env().context("loading configuration")?;

    let store: Arc<dyn SheetStore> = Arc::new(SheetsClient::new(
        &config.sheet_id,
        &config.store_token,
        config.request_timeout,
        config.cache_ttl,
        RetryPolicy::default(),
    )?);

    let discord = DiscordClient::new(
        &config.platform_token,
        &config.application_id,
        config.request_timeout,
    )?;
    if let Err(e) = discord.register_commands(config.guild_id).await {
        // Commands registered on a previous run keep working
        tracing::warn!(error = %e, "command registration failed; continuing");
    }
    let platform: Arc<dyn ChatPlatform> = Arc::new(discord);

    let ctx = BotContext::new(config, store, platform);

    if let Err(e) = ctx.repo.ensure_headers().await {
        tracing::warn!(error = %e, "header check failed; continuing");
    }

    // An unreadable metadata tab is the one fatal startup condition
    let loaded = ctx.repo.load_all().await.context("loading metadata")?;

    let revival = RevivalEngine::new(
        Arc::clone(&ctx.platform),
        Arc::clone(&ctx.repo),
        ctx.config.revival_concurrency,
    );
    let report = revival.run(loaded.usable).await;
    if !report.is_clean() {
        tracing::warn!(failed = ?report.failed, "some entities did not revive");
    }

    let scheduler = Arc::new(ResultsScheduler::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.platform),
        Arc::clone(&ctx.repo),
        ctx.config.results_interval,
    ));
    let scheduler_handle = scheduler.spawn();

    let (event_tx, event_rx) = mpsc::channel(64);
    ctx.platform
        .start(event_tx)
        .await
        .context("starting platform event stream")?;

    let cancel = CancellationToken::new();
    let gateway = InteractionGateway::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.platform),
        Arc::clone(&ctx.repo),
        ctx.config.results_interval,
    );

    tokio::select! {
        _ = gateway.run(event_rx, cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    cancel.cancel();
    scheduler.stop();
    if let Err(e) = ctx.platform.stop().await {
        tracing::warn!(error = %e, "platform stop failed");
    }
    if let Err(e) = scheduler_handle.await {
        tracing::warn!(error = %e, "scheduler task join failed");
    }
    tracing::info!("shutdown complete");
    Ok(())
}
