use anyhow::Context;
use db::DBService;
use server::{Deployment, routes};
use services::services::{
    workflow_alerts::WorkflowAlertService, workflow_definition::seed_default_catalog,
};
use tracing::{info, warn};
use utils::{config::Config, logging::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,server=debug,services=debug,db=info");

    let config = Config::from_env().context("invalid configuration")?;
    let db = DBService::connect(&config.database_url).await?;

    match db.migrate().await {
        Ok(report) => info!(
            newly_applied = report.newly_applied,
            total_applied = report.total_applied,
            "Database migrations up to date"
        ),
        Err(e) if e.is_schema_not_empty() => {
            warn!("{}; continuing with the existing schema", e)
        }
        Err(e) => return Err(e).context("failed to migrate database"),
    }

    if seed_default_catalog(&db.pool).await? {
        info!("Seeded the default workflow catalog");
    }

    let alert_service = WorkflowAlertService::spawn(db.clone(), config.alert_poll_interval).await;

    let addr = (config.host, config.port);
    let deployment = Deployment::new(db.clone(), config)?;
    let app = routes::router(deployment);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    alert_service.abort();
    db.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
