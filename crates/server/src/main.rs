//! Courier consumer entry point.

mod handlers;

use courier_common::{AppError, AppResult, Config, LogFormat};
use courier_queue::{Dispatcher, QueueRegistry, RetryPolicy};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Consume the default queue until a shutdown signal or a fatal driver error.
async fn run(config: Config) -> AppResult<()> {
    let shutdown = CancellationToken::new();

    let registry =
        QueueRegistry::connect(&config.queue, config.redis.as_ref(), shutdown.clone()).await?;

    let handlers = handlers::registry()?;
    let dispatcher = Dispatcher::new(registry.clone(), registry.default_queue(), handlers)
        .with_policy(RetryPolicy::from(&config.queue));

    let mut consumer = tokio::spawn(async move { dispatcher.run().await });

    let joined = tokio::select! {
        () = shutdown_signal() => {
            shutdown.cancel();
            consumer.await
        },
        joined = &mut consumer => joined,
    };

    // The driver is released on every exit path, including a failed consume loop.
    if let Err(e) = registry.close().await {
        error!(error = %e, "Failed to close queue driver");
    }

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => info!("Queue consumer stopped"),
        Ok(Err(e)) => return Err(e.into()),
        Err(e) => return Err(AppError::Internal(format!("Queue consumer panicked: {e}"))),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    init_tracing(config.log.format);

    info!(driver = %config.queue.driver, "Starting courier consumer...");

    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "Queue consumer terminated");
        return Err(e.into());
    }

    info!("Consumer shutdown complete");
    Ok(())
}
