//! pejl-se (Survey Engine) - anonymous friction-survey service
//!
//! Collects anonymous Likert responses through single-use tokens,
//! aggregates them into friction scores, and drives scheduled assessment
//! delivery from a background scan loop.

use anyhow::Result;
use clap::Parser;
use pejl_se::delivery::{DbContactDirectory, HttpDelivery, LogDelivery, LoggingRetention};
use pejl_se::ports::DeliveryPort;
use pejl_se::scheduler::{Scheduler, SchedulerConfig};
use pejl_se::scoring::ScoringConfig;
use pejl_se::{build_router, AppState};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pejl-se", about = "Pejl survey engine")]
struct Args {
    /// Root folder holding pejl.db (overrides PEJL_ROOT and config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// HTTP listen port
    #[arg(long, default_value_t = 5730)]
    port: u16,

    /// Delivery service endpoint; omitted = log-only delivery
    #[arg(long, env = "PEJL_DELIVERY_URL")]
    delivery_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber before anything else can log
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!(
        "Starting Pejl Survey Engine (pejl-se) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let root_folder =
        pejl_common::config::resolve_root_folder(args.root_folder.as_deref(), "PEJL_ROOT")?;
    let db_path = pejl_common::config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = pejl_common::db::init_database(&db_path).await?;

    let scoring = ScoringConfig::from_database(&pool).await;
    let scheduler_config = SchedulerConfig::from_database(&pool).await;

    let delivery: Arc<dyn DeliveryPort> = match &args.delivery_url {
        Some(url) => {
            info!("Delivery service: {}", url);
            Arc::new(HttpDelivery::new(url.clone()))
        }
        None => {
            info!("No delivery service configured, dispatch is log-only");
            Arc::new(LogDelivery)
        }
    };
    let contacts = Arc::new(DbContactDirectory::new(pool.clone()));
    let retention = Arc::new(LoggingRetention);

    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        delivery,
        contacts,
        retention,
        scheduler_config,
    ));
    let scheduler_handle = scheduler.clone().start();

    let state = AppState::new(pool, scoring);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("pejl-se listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the in-flight scan finish before the process exits
    info!("Shutdown requested, stopping scheduler");
    scheduler.request_stop();
    let _ = scheduler_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
