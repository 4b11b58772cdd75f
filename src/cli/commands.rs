//! CLI Command Implementations

use std::sync::Arc;

use tracing::info;

use crate::client::HttpEngineClient;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::line;
use crate::server;
use crate::supervisor::Supervisor;

/// Wire supervisor and engine client from configuration.
pub fn build_dispatcher(config: &BridgeConfig) -> Result<Dispatcher> {
    let supervisor = Supervisor::from_config(config)?;
    let client = HttpEngineClient::from_config(config);
    Ok(Dispatcher::new(supervisor, Arc::new(client)))
}

/// Run the HTTP bridge until shutdown.
pub async fn serve(config: &BridgeConfig) -> Result<()> {
    info!(
        upstream = %config.upstream_url,
        auto_start = config.auto_start,
        "Starting Nueva bridge v{}",
        env!("CARGO_PKG_VERSION")
    );
    let dispatcher = build_dispatcher(config)?;
    server::run(config, dispatcher).await
}

/// Serve the line protocol until stdin closes, then stop the engine.
pub async fn stdio(config: &BridgeConfig) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let supervisor = dispatcher.supervisor().clone();

    let served = line::serve_stdio(dispatcher).await;
    supervisor.stop().await;
    served
}

/// One health probe. Returns whether the engine answered.
pub async fn check(config: &BridgeConfig) -> Result<bool> {
    let supervisor = Supervisor::from_config(config)?;
    let healthy = supervisor.health_check().await;

    println!("ACE-Step API: {}", config.upstream_url);
    if healthy {
        println!("Status: connected");
    } else {
        println!("Status: disconnected");
        println!("Auto-start: {}", if config.auto_start { "enabled" } else { "disabled" });
    }
    Ok(healthy)
}
