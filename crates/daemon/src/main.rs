//! GarlicRouter Daemon Binary
//!
//! Loads the on-disk identity and settings, starts the router's
//! maintenance pumps, and serves the admin IPC socket until interrupted.

use std::sync::Arc;

use garlicrouter_daemon::{DaemonError, IpcConfig, IpcServer, RouterService};
use garlicrouter_router::Router;
use garlicrouter_settings::Settings;

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    garlicrouter_logging::init();

    tracing::info!("starting GarlicRouter daemon");

    let settings = Settings::load_or_default().map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;
    let key_path = garlicrouter_keystore::default_key_path();
    let _keys = garlicrouter_keystore::load_or_generate_router_keys(&key_path)
        .map_err(|e| DaemonError::InvalidRequest(e.to_string()))?;

    let router = Arc::new(Router::new(settings.router.clone()));
    router.start().map_err(DaemonError::RouterError)?;

    let config = IpcConfig::default();
    tracing::info!("daemon starting, will listen on {:?}", config.socket_path);

    let service = RouterService::new(router.clone());
    let mut ipc = IpcServer::new(config);

    tokio::select! {
        result = ipc.start(service) => {
            if let Err(e) = result {
                tracing::error!("IPC server error: {}", e);
                router.stop().ok();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            ipc.stop().await;
        }
    }

    router.stop().map_err(DaemonError::RouterError)?;
    tracing::info!("daemon stopped");
    Ok(())
}
