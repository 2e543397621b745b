use crate::cache::ComputeCache;
use crate::config::Config;
use crate::source::UpstreamSource;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::create_router;
use anyhow::Context;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Build the cache, the upstream client and the shared state.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let cache = match config.cache_max_entries {
            Some(max) => ComputeCache::bounded(config.ttl_policy.clone(), max),
            None => ComputeCache::new(config.ttl_policy.clone()),
        };
        for (class, ttl) in config.ttl_policy.entries() {
            info!(class = %class, ttl = fmt_duration(ttl), "ttl class");
        }

        let source = UpstreamSource::new(&config.analytics_upstream_url, config.upstream_timeout)
            .context("Failed to create upstream source")?;
        info!(
            upstream = %config.analytics_upstream_url,
            timeout = fmt_duration(config.upstream_timeout),
            "analytics upstream configured"
        );

        let app_state = AppState::new(cache, Arc::new(source))
            .with_wait_timeout(config.cache_wait_timeout)
            .with_admin_token(config.cache_admin_token.as_deref());
        if config.cache_admin_token.is_none() {
            info!("CACHE_ADMIN_TOKEN not set, cache admin endpoints disabled");
        }

        Ok(App { config, app_state })
    }

    /// Serve until a shutdown signal arrives, then drain within `SHUTDOWN_TIMEOUT`.
    pub async fn run(self) -> ExitCode {
        let shutdown = CancellationToken::new();
        let sweeper = self
            .app_state
            .cache
            .spawn_sweeper(self.config.cache_sweep_interval, shutdown.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = ?e, %addr, "failed to bind");
                shutdown.cancel();
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");

        let router = create_router(self.app_state.clone());
        let server_shutdown = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
        });

        let exit_code = tokio::select! {
            () = shutdown_signal() => {
                shutdown.cancel();
                match tokio::time::timeout(self.config.shutdown_timeout, &mut server).await {
                    Ok(Ok(Ok(()))) => {
                        info!("graceful shutdown complete");
                        ExitCode::SUCCESS
                    }
                    Ok(Ok(Err(e))) => {
                        error!(error = ?e, "server error during shutdown");
                        ExitCode::FAILURE
                    }
                    Ok(Err(e)) => {
                        error!(error = ?e, "server task panicked");
                        ExitCode::FAILURE
                    }
                    Err(_) => {
                        warn!(
                            timeout = fmt_duration(self.config.shutdown_timeout),
                            "graceful shutdown timed out, abandoning in-flight requests"
                        );
                        server.abort();
                        ExitCode::FAILURE
                    }
                }
            }
            result = &mut server => {
                shutdown.cancel();
                match result {
                    Ok(Ok(())) => {
                        warn!("web server exited unexpectedly");
                        ExitCode::FAILURE
                    }
                    Ok(Err(e)) => {
                        error!(error = ?e, "web server failed");
                        ExitCode::FAILURE
                    }
                    Err(e) => {
                        error!(error = ?e, "web server task panicked");
                        ExitCode::FAILURE
                    }
                }
            }
        };

        if let Err(e) = sweeper.await {
            warn!(error = ?e, "cache sweeper did not stop cleanly");
        }
        let stats = self.app_state.cache.stats();
        info!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            "cache totals at shutdown"
        );
        exit_code
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "failed to install Ctrl+C handler");
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
                error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
