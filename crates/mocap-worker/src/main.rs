//! Mocap pipeline worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mocap_media::FileStore;
use mocap_registry::JobRegistry;
use mocap_worker::{MocapPipeline, Scheduler, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("mocap=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting mocap-worker");

    let config = Arc::new(WorkerConfig::from_env());
    info!("Worker config: {:?}", config);

    let files = Arc::new(FileStore::new(
        &config.upload_dir,
        &config.temp_dir,
        &config.result_dir,
    ));
    files
        .ensure_dirs()
        .await
        .context("Failed to create working directories")?;
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("Failed to create output directory")?;

    // Constructed once at startup; the request layer receives these same
    // handles, never its own globals.
    let registry = Arc::new(JobRegistry::new(Arc::clone(&files), config.max_queue_size));
    let pipeline = Arc::new(
        MocapPipeline::new(Arc::clone(&config)).context("Failed to create pipeline")?,
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&registry),
        pipeline,
        Arc::clone(&config),
    ));

    // Shutdown on ctrl-c
    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            if shutdown.send(true).is_err() {
                error!("Scheduler already gone");
            }
        }
    });

    // Retention sweep runs beside the scheduler loop
    let sweeper = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_sweeper().await })
    };

    scheduler.run().await;
    sweeper.abort();

    info!("Worker shutdown complete");
    Ok(())
}
