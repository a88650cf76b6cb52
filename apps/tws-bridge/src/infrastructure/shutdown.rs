//! Process Shutdown
//!
//! Signal handling and session teardown shared by the binaries.

use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::application::ports::TerminalSession;

/// Upper bound on session teardown at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for SIGINT or SIGTERM, then cancel `shutdown_token`.
#[allow(clippy::expect_used)]
pub async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

/// Cancel the outstanding historical request and close the session.
pub async fn close_session(session: &dyn TerminalSession, request_id: i32) {
    let teardown = async {
        if session.state().is_connected()
            && let Err(e) = session.cancel_historical_data(request_id).await
        {
            tracing::warn!(request_id, error = %e, "Failed to cancel historical data request");
        }
        session.disconnect().await;
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, teardown).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Session teardown timed out"
        );
    }
}
