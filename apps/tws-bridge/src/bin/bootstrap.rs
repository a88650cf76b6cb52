//! Standalone Bootstrap Binary
//!
//! Connects to the trading terminal, issues the startup historical data
//! request and keeps the session open until Ctrl+C or until the terminal
//! drops the connection. No HTTP server.
//!
//! ```bash
//! cargo run --bin tws-bootstrap
//! ```
//!
//! Reads the same environment variables as `tws-bridge` (`HTTP_PORT` is
//! validated but unused).

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tws_bridge::application::services::BOOTSTRAP_REQUEST_ID;
use tws_bridge::infrastructure::shutdown::{await_shutdown, close_session};
use tws_bridge::infrastructure::telemetry;
use tws_bridge::{
    BootstrapSettings, Bootstrapper, BridgeConfig, ConnectionState, TerminalSession, TwsClient,
    TwsClientConfig, load_dotenv,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let _telemetry_guard = telemetry::init();

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    tracing::info!(terminal = %config.terminal, "Bootstrapping terminal session");

    let session: Arc<dyn TerminalSession> = Arc::new(TwsClient::new(TwsClientConfig::new(
        config.terminal.host.clone(),
        config.terminal.port,
        config.terminal.client_id,
    )));
    let bootstrapper = Bootstrapper::new(Arc::clone(&session), BootstrapSettings::default());

    match bootstrapper.initialize().await {
        Ok(outcome) => tracing::info!(?outcome, "Bootstrap finished"),
        Err(e) => {
            tracing::error!(error = %e, "Bootstrap failed");
            return Ok(());
        }
    }

    let shutdown_token = CancellationToken::new();
    let mut state = session.watch_state();
    tokio::select! {
        () = await_shutdown(shutdown_token) => {}
        _ = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
            tracing::info!("Terminal session ended");
        }
    }

    close_session(session.as_ref(), BOOTSTRAP_REQUEST_ID).await;
    bootstrapper.shutdown();
    Ok(())
}
