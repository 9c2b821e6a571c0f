use std::sync::Arc;

use anyhow::Context;

use stockledger_infra::config::Settings;
use stockledger_infra::reconciliation::{ExpiredReservationSweepJob, LowStockSweepJob};
use stockledger_infra::sinks::{TracingAuditSink, TracingNotificationSink};
use stockledger_infra::{
    InventoryCore, JobScheduler, PostgresInventoryStore, RecurringJob, TokioJobScheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine outside local development.
    let _ = dotenvy::dotenv();

    let settings = Settings::load().context("failed to load configuration")?;
    stockledger_observability::init_with(settings.logging.format, &settings.logging.filter);

    let store = PostgresInventoryStore::connect(
        &settings.database.url,
        settings.database.max_connections,
    )
    .await
    .context("failed to connect to postgres")?;
    if settings.database.apply_schema {
        store.apply_schema().await.context("failed to apply schema")?;
    }

    let core = Arc::new(
        InventoryCore::new(Arc::new(store), settings.core_settings())
            .with_audit(Arc::new(TracingAuditSink))
            .with_notifier(Arc::new(TracingNotificationSink)),
    );

    let expired: Arc<dyn RecurringJob> = Arc::new(ExpiredReservationSweepJob::new(
        core.clone(),
        settings.sweep_options(),
    ));
    let low_stock: Arc<dyn RecurringJob> = Arc::new(LowStockSweepJob::new(core));

    let scheduler = TokioJobScheduler::default();
    let handles = vec![
        scheduler.schedule(expired.name(), settings.expired_sweep_interval(), expired),
        scheduler.schedule(low_stock.name(), settings.low_stock_interval(), low_stock),
    ];
    tracing::info!(
        environment = %settings.environment,
        jobs = handles.len(),
        "stockledger worker running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    for handle in handles {
        handle.shutdown().await;
    }
    Ok(())
}
