//! The Supervisor owns the long-running services (monitor scheduler, HTTP
//! API) and manages startup, shutdown signals and graceful drain.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::signal;

use crate::{
    config::AppConfig,
    http_server::{self, ApiState},
    persistence::{traits::Store, SqliteStore},
    scanner::ScanPipeline,
    scheduler::MonitorScheduler,
};

/// Errors during supervisor construction and operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the builder.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// The scan store could not be reached or migrated at startup.
    #[error("Scan store unreachable: {0}")]
    StoreUnreachable(String),

    /// The configuration was rejected while wiring components.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    config: Arc<AppConfig>,
    store: Arc<SqliteStore>,
    pipeline: Arc<ScanPipeline>,
    cancellation_token: tokio_util::sync::CancellationToken,
    join_set: tokio::task::JoinSet<()>,
}

impl Supervisor {
    /// Returns a new builder, the public entry point for constructing a
    /// supervisor.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The scan pipeline, for one-shot CLI scans.
    pub fn pipeline(&self) -> Arc<ScanPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Starts all services and blocks until shutdown.
    ///
    /// Spawns the signal handler, the monitor scheduler and the HTTP server,
    /// then supervises them: a shutdown signal or a failed critical task
    /// cancels everything, and the remaining tasks are drained within the
    /// configured timeout.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await;
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
            }

            cancellation_token.cancel();
        });

        let store_dyn: Arc<dyn Store> = self.store.clone();
        let scheduler = MonitorScheduler::new(
            Arc::clone(&store_dyn),
            Arc::clone(&self.pipeline),
            self.config.monitor_pool_size,
            self.config.tick_interval(),
            self.cancellation_token.clone(),
        );
        self.join_set.spawn(scheduler.run());

        let api_state =
            ApiState::new(store_dyn, Arc::clone(&self.pipeline), Arc::clone(&self.config));
        let listen_address = self.config.listen_address.clone();
        let server_token = self.cancellation_token.clone();
        let failure_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            if let Err(e) = http_server::run_server(&listen_address, api_state, server_token).await
            {
                tracing::error!(error = %e, "HTTP server failed");
                failure_token.cancel();
            }
        });

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Supervisor cancellation signal received, shutting down...");
                    break;
                }

                Some(result) = self.join_set.join_next() => {
                    if let Err(e) = result {
                        tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                        self.cancellation_token.cancel();
                    }
                }
            }
        }

        let shutdown_timeout = self.config.shutdown_timeout();
        let drain = async {
            while self.join_set.join_next().await.is_some() {}
        };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                "Drain did not complete within {:?}, aborting remaining tasks.",
                shutdown_timeout
            );
            self.join_set.shutdown().await;
        }

        self.store.close().await;
        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}
