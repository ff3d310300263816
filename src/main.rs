//! Ferrix bridge: runs the compiled-in plugins against the download engine host.
//!
//! The host drives this process over stdin/stdout; logs go to stderr.

mod host;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use ferrix_core::config::AppConfig;
use ferrix_core::AppResult;
use ferrix_plugin::{Dispatcher, PluginManager};
use plugin_batch::BatchExpansionPlugin;

use crate::host::StdioHost;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Bridge error");
        std::process::exit(1);
    }
}

/// Load configuration from an explicit file or the `config/` directory.
fn load_configuration() -> AppResult<AppConfig> {
    match std::env::var("FERRIX_CONFIG") {
        Ok(path) => AppConfig::load_file(&path),
        Err(_) => {
            let env = std::env::var("FERRIX_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging on stderr.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> AppResult<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Ferrix bridge");

    let host_closed = CancellationToken::new();
    let host = StdioHost::spawn(host_closed.clone(), config.bridge.local_http_head)?;

    let dispatcher = Arc::new(Dispatcher::new(host.clone(), config.bridge.clone()));
    let plugin_manager = PluginManager::new(Arc::clone(&dispatcher));

    if config.plugins.batch_expansion {
        plugin_manager
            .load_plugin(Arc::new(BatchExpansionPlugin::new(config.prober.clone())))
            .await?;
    } else {
        info!("Batch expansion disabled by configuration");
    }

    info!(
        plugins = plugin_manager.list_plugins().await.len(),
        registrations = dispatcher.registration_count().await,
        "Bridge ready"
    );

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = host_closed.cancelled() => info!("Host disconnected"),
    }

    plugin_manager.unload_all().await;
    dispatcher.shutdown().await;
    host.close().await;

    info!("Ferrix bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
