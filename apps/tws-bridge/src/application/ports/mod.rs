//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TerminalSession`: a session with the trading terminal (TWS or
//!   IB Gateway), implemented by `infrastructure::tws::TwsClient`.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::domain::events::{ConnectionState, TerminalEvent};
use crate::domain::historical::HistoricalDataRequest;

/// Errors surfaced by a terminal session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The TCP connection could not be opened.
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Terminal address.
        address: String,
        /// Underlying error.
        reason: String,
    },

    /// The terminal did not complete the handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A session is already open.
    #[error("session already connected")]
    AlreadyConnected,

    /// The session is not connected.
    #[error("session not connected")]
    NotConnected,

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Point-in-time view of a session, served on the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Terminal address (`host:port`).
    pub address: String,
    /// Client id used for the session.
    pub client_id: i32,
    /// Negotiated server version (0 before the handshake).
    pub server_version: i32,
    /// Connection time reported by the terminal.
    pub connection_time: Option<String>,
    /// Next valid order id announced by the terminal.
    pub next_valid_id: Option<i32>,
    /// Accounts managed by the login.
    pub managed_accounts: Vec<String>,
    /// Historical bars received (snapshot and updates).
    pub bars_received: u64,
    /// Error messages received.
    pub errors_received: u64,
}

/// A session with the trading terminal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalSession: Send + Sync {
    /// Open the connection and run the handshake.
    ///
    /// Returns once the socket is open and the API has been started; the
    /// session becomes ready later, see [`TerminalSession::watch_state`].
    async fn connect(&self) -> Result<(), SessionError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Receiver that observes every state transition.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Subscribe to events delivered after this call.
    fn subscribe(&self) -> broadcast::Receiver<TerminalEvent>;

    /// Send a historical data request.
    async fn request_historical_data(
        &self,
        request: &HistoricalDataRequest,
    ) -> Result<(), SessionError>;

    /// Cancel a historical data request.
    async fn cancel_historical_data(&self, request_id: i32) -> Result<(), SessionError>;

    /// Close the session. Safe to call more than once.
    async fn disconnect(&self);

    /// Snapshot of the session for reporting.
    fn snapshot(&self) -> SessionSnapshot;
}
