//! Tidemark - lease-based entity sync host
//!
//! `tidemark [scheduler|queue]`. The mode may also come from `TIDEMARK_MODE`.

use tidemark_app::{run_queue_fan_out, AppContext, Mode};
use tidemark_domain::{Config, QueueBehavior, SyncTriggerType};
use tidemark_infra::{config, init_logging};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const QUEUE_WORKERS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let (config, config_error) = match config::load() {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    // Initialize logging before anything else reports
    init_logging(&config.logging)?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(err) => debug!(error = %err, "No .env file loaded"),
    }
    if let Some(err) = config_error {
        warn!(error = %err, "Falling back to default configuration");
    }

    let mode = Mode::resolve(std::env::args().nth(1), std::env::var("TIDEMARK_MODE").ok())
        .map_err(anyhow::Error::msg)?;
    info!(%mode, "Tidemark starting");

    let ctx = AppContext::new(config)?;

    match mode {
        Mode::Scheduler => run_scheduler(&ctx).await?,
        Mode::Queue => run_queue(&ctx).await?,
    }

    info!("Tidemark stopped");
    Ok(())
}

async fn run_scheduler(ctx: &AppContext) -> anyhow::Result<()> {
    if !ctx.config.scheduler.enabled {
        info!("Scheduler disabled, running a single pass");
        let results = ctx
            .sync_service
            .sync_all_eligible(SyncTriggerType::Timer, &CancellationToken::new())
            .await?;
        info!(synced = results.len(), "Single pass finished");
        return Ok(());
    }

    let mut scheduler = ctx.start_scheduler().await?;
    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    scheduler.stop().await?;
    Ok(())
}

async fn run_queue(ctx: &AppContext) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = run_queue_fan_out(
        ctx,
        SyncTriggerType::Manual,
        QueueBehavior::QueueAll,
        QUEUE_WORKERS,
        &cancel,
    )
    .await?;

    info!(
        queued = report.queued,
        completed = report.completed,
        failed = report.failed,
        skipped = report.skipped,
        "Queue fan-out finished"
    );
    Ok(())
}
