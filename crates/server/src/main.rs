//! offgrid-agent entry point.
//!
//! Boots the interceptor and host coordinator and serves them as an MCP
//! server on stdio. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offgrid_client::{
    CoordinatorConfig, ErrorSignals, HostCoordinator, HttpTransport, InProcessRegistration, Interceptor, Transport,
    TransportConfig,
};
use offgrid_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod handler;
mod notify;
mod tools;

const NOTIFY_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "starting offgrid-agent on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let signals = ErrorSignals::new();
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(TransportConfig::from(&config), signals.clone())?);
    let interceptor = Arc::new(Interceptor::from_config(
        &config,
        db.clone(),
        Arc::clone(&transport),
        signals.clone(),
        Arc::new(InProcessRegistration::new()),
    )?);

    let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CAPACITY);
    let signal_forwarder = interceptor.forward_signals();
    let event_forwarder = notify::forward_host_events(interceptor.lifecycle().subscribe(), notify_tx.clone());

    let coordinator_config = CoordinatorConfig::from_app(&config)?;
    let script_url = coordinator_config.script_url.clone();
    let coordinator = Arc::new(HostCoordinator::new(
        coordinator_config,
        db,
        transport,
        Arc::clone(interceptor.lifecycle()),
        signals,
        Arc::new(notify::ChannelReloader::new(notify_tx.clone())),
    ));

    let handler = handler::OffgridServer::new(Arc::clone(&interceptor), Arc::clone(&coordinator));
    let server = serve_server(handler, stdio()).await?;
    let notifier = tokio::spawn(notify::notify_peer(notify_rx, server.peer().clone()));

    // Registration and the load checks run once the client is listening for their events.
    if let Err(e) = interceptor.lifecycle().register(&script_url).await {
        tracing::warn!(error = %e, "interceptor registration failed at startup");
    }
    let outcome = coordinator.run_on_load().await?;
    notify_tx.send(json!({ "type": "LOAD", "result": outcome })).await?;

    let ticker = config.drain_interval().map(|every| {
        let interceptor = Arc::clone(&interceptor);
        let out = notify_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = interceptor.sync().await;
                if !report.is_empty() && out.send(json!({ "type": "SYNC", "report": report })).await.is_err() {
                    break;
                }
            }
        })
    });

    let reason = server.waiting().await?;
    tracing::info!(?reason, "offgrid-agent shutting down");

    signal_forwarder.abort();
    event_forwarder.abort();
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    notifier.abort();
    Ok(())
}
