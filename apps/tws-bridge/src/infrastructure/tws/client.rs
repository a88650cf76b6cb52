//! TWS Session Client
//!
//! Owns the socket to TWS / IB Gateway. `connect` runs the handshake and
//! spawns a reader task that decodes incoming frames, updates the session
//! info and fans events out on a broadcast channel.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect--> Connecting --NEXT_VALID_ID--> Connected
//!       ^                        |                            |
//!       +------ socket closed / disconnect() -----------------+
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, watch};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use super::codec::{API_PREFIX, DecodeError, MIN_CLIENT_VERSION, frame_codec, version_range};
use super::messages::{
    ServerHello, decode_message, decode_server_hello, encode_cancel_historical,
    encode_historical_request, encode_start_api,
};
use crate::application::ports::{SessionError, SessionSnapshot, TerminalSession};
use crate::domain::events::{ConnectionState, TerminalEvent};
use crate::domain::historical::HistoricalDataRequest;
use crate::infrastructure::metrics;

type FrameReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type FrameWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the TWS client.
#[derive(Debug, thiserror::Error)]
pub enum TwsClientError {
    /// TCP connection failed.
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        /// Terminal address.
        address: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Socket error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Terminal speaks a protocol version older than supported.
    #[error("unsupported server version {0}")]
    UnsupportedServerVersion(i32),

    /// A session is already open.
    #[error("already connected")]
    AlreadyConnected,

    /// The session is not connected.
    #[error("not connected")]
    NotConnected,
}

impl From<TwsClientError> for SessionError {
    fn from(err: TwsClientError) -> Self {
        match err {
            TwsClientError::ConnectFailed { address, source } => Self::ConnectFailed {
                address,
                reason: source.to_string(),
            },
            TwsClientError::Io(e) => Self::SendFailed(e.to_string()),
            TwsClientError::Decode(e) => Self::Handshake(e.to_string()),
            TwsClientError::Handshake(msg) => Self::Handshake(msg),
            TwsClientError::UnsupportedServerVersion(v) => {
                Self::Handshake(format!("unsupported server version {v}"))
            }
            TwsClientError::AlreadyConnected => Self::AlreadyConnected,
            TwsClientError::NotConnected => Self::NotConnected,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the TWS client.
#[derive(Debug, Clone)]
pub struct TwsClientConfig {
    /// Terminal host.
    pub host: String,
    /// Terminal API port.
    pub port: u16,
    /// Client id announced in `START_API`.
    pub client_id: i32,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl TwsClientConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, client_id: i32) -> Self {
        Self {
            host: host.into(),
            port,
            client_id,
            event_capacity: 1024,
        }
    }

    /// `host:port` of the terminal.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Shared Session State
// =============================================================================

#[derive(Debug, Default)]
struct SessionInfo {
    server_version: i32,
    connection_time: Option<String>,
    next_valid_id: Option<i32>,
    managed_accounts: Vec<String>,
}

/// State shared between the client and its reader task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    info: RwLock<SessionInfo>,
    events: broadcast::Sender<TerminalEvent>,
    bars_received: AtomicU64,
    errors_received: AtomicU64,
}

impl Shared {
    fn new(event_capacity: usize) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            state,
            info: RwLock::new(SessionInfo::default()),
            events,
            bars_received: AtomicU64::new(0),
            errors_received: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        metrics::set_connection_state(state);
    }

    fn emit(&self, event: TerminalEvent) {
        metrics::record_terminal_event(event.kind());
        // no listeners is fine
        let _ = self.events.send(event);
    }

    /// Move to `Disconnected` once; later calls are no-ops.
    fn mark_disconnected(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        });
        if changed {
            metrics::set_connection_state(ConnectionState::Disconnected);
            self.emit(TerminalEvent::Disconnected);
        }
    }

    fn apply(&self, event: TerminalEvent) {
        match &event {
            TerminalEvent::NextValidId(order_id) => {
                self.info.write().next_valid_id = Some(*order_id);
                let became_ready = self.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                });
                if became_ready {
                    metrics::set_connection_state(ConnectionState::Connected);
                    let server_version = self.info.read().server_version;
                    self.emit(TerminalEvent::Connected { server_version });
                }
            }
            TerminalEvent::ManagedAccounts(accounts) => {
                self.info.write().managed_accounts.clone_from(accounts);
            }
            TerminalEvent::HistoricalData { .. } | TerminalEvent::HistoricalDataUpdate { .. } => {
                self.bars_received.fetch_add(1, Ordering::Relaxed);
            }
            TerminalEvent::Error(error) => {
                self.errors_received.fetch_add(1, Ordering::Relaxed);
                metrics::record_terminal_error(error.code);
            }
            _ => {}
        }
        self.emit(event);
    }
}

// =============================================================================
// TWS Client
// =============================================================================

/// Session with TWS or IB Gateway.
pub struct TwsClient {
    config: TwsClientConfig,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    reader_cancel: Mutex<Option<CancellationToken>>,
}

impl TwsClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(config: TwsClientConfig) -> Self {
        let shared = Arc::new(Shared::new(config.event_capacity));
        Self {
            config,
            shared,
            writer: tokio::sync::Mutex::new(None),
            reader_cancel: Mutex::new(None),
        }
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &TwsClientConfig {
        &self.config
    }

    fn current_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Negotiated server version (0 before the handshake).
    #[must_use]
    pub fn server_version(&self) -> i32 {
        self.shared.info.read().server_version
    }

    /// Open the socket, run the handshake and start the reader task.
    ///
    /// # Errors
    ///
    /// Returns `TwsClientError` if the socket cannot be opened or the
    /// terminal does not answer the handshake.
    pub async fn open(&self) -> Result<(), TwsClientError> {
        let opened = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !opened {
            return Err(TwsClientError::AlreadyConnected);
        }
        metrics::set_connection_state(ConnectionState::Connecting);

        let (reader, writer, hello) = match self.handshake().await {
            Ok(parts) => parts,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        tracing::info!(
            server_version = hello.server_version,
            connection_time = %hello.connection_time,
            "Terminal handshake complete"
        );

        {
            let mut info = self.shared.info.write();
            info.server_version = hello.server_version;
            info.connection_time = Some(hello.connection_time);
        }
        *self.writer.lock().await = Some(writer);

        let cancel = CancellationToken::new();
        *self.reader_cancel.lock() = Some(cancel.clone());
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.shared),
            cancel,
            hello.server_version,
        ));

        Ok(())
    }

    async fn handshake(&self) -> Result<(FrameReader, FrameWriter, ServerHello), TwsClientError> {
        let address = self.config.address();
        tracing::info!(%address, client_id = self.config.client_id, "Connecting to terminal");

        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| TwsClientError::ConnectFailed { address, source })?;
        stream.set_nodelay(true)?;
        stream.write_all(API_PREFIX).await?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, frame_codec());
        let mut writer = FramedWrite::new(write_half, frame_codec());

        writer.send(version_range()).await?;

        let frame = reader.next().await.ok_or_else(|| {
            TwsClientError::Handshake("connection closed before server version".to_string())
        })??;
        let hello = decode_server_hello(&frame)?;
        if hello.server_version < MIN_CLIENT_VERSION {
            return Err(TwsClientError::UnsupportedServerVersion(
                hello.server_version,
            ));
        }

        writer.send(encode_start_api(self.config.client_id)).await?;
        Ok((reader, writer, hello))
    }

    async fn send(&self, payload: Bytes) -> Result<(), TwsClientError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TwsClientError::NotConnected)?;
        writer.send(payload).await?;
        Ok(())
    }

    /// Send a historical data request.
    ///
    /// # Errors
    ///
    /// Returns `TwsClientError::NotConnected` before the session is ready,
    /// or a socket error if the write fails.
    pub async fn send_historical_request(
        &self,
        request: &HistoricalDataRequest,
    ) -> Result<(), TwsClientError> {
        if !self.current_state().is_connected() {
            metrics::record_historical_request("not_connected");
            return Err(TwsClientError::NotConnected);
        }
        tracing::debug!(
            request_id = request.request_id,
            contract = %request.contract,
            "Sending historical data request"
        );
        let result = self
            .send(encode_historical_request(request, self.server_version()))
            .await;
        metrics::record_historical_request(if result.is_ok() { "sent" } else { "failed" });
        result
    }

    /// Cancel a historical data request.
    ///
    /// # Errors
    ///
    /// Returns `TwsClientError::NotConnected` if there is no session, or a
    /// socket error if the write fails.
    pub async fn send_cancel_historical(&self, request_id: i32) -> Result<(), TwsClientError> {
        if !self.current_state().is_connected() {
            return Err(TwsClientError::NotConnected);
        }
        self.send(encode_cancel_historical(request_id)).await
    }

    /// Close the socket and stop the reader task.
    pub async fn close(&self) {
        let cancel = self.reader_cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = SinkExt::<Bytes>::close(&mut writer).await;
            tracing::info!(address = %self.config.address(), "Disconnected from terminal");
        }

        self.shared.mark_disconnected();
    }
}

async fn read_loop(
    mut reader: FrameReader,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    server_version: i32,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            frame = reader.next() => match frame {
                Some(Ok(payload)) => match decode_message(&payload, server_version) {
                    Ok(events) => {
                        for event in events {
                            shared.apply(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to decode terminal message");
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Terminal socket error");
                    break;
                }
                None => {
                    tracing::info!("Terminal closed the connection");
                    break;
                }
            }
        }
    }
    shared.mark_disconnected();
}

#[async_trait]
impl TerminalSession for TwsClient {
    async fn connect(&self) -> Result<(), SessionError> {
        self.open().await.map_err(Into::into)
    }

    fn state(&self) -> ConnectionState {
        self.current_state()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.shared.events.subscribe()
    }

    async fn request_historical_data(
        &self,
        request: &HistoricalDataRequest,
    ) -> Result<(), SessionError> {
        self.send_historical_request(request)
            .await
            .map_err(Into::into)
    }

    async fn cancel_historical_data(&self, request_id: i32) -> Result<(), SessionError> {
        self.send_cancel_historical(request_id)
            .await
            .map_err(Into::into)
    }

    async fn disconnect(&self) {
        self.close().await;
    }

    fn snapshot(&self) -> SessionSnapshot {
        let info = self.shared.info.read();
        SessionSnapshot {
            state: self.current_state(),
            address: self.config.address(),
            client_id: self.config.client_id,
            server_version: info.server_version,
            connection_time: info.connection_time.clone(),
            next_valid_id: info.next_valid_id,
            managed_accounts: info.managed_accounts.clone(),
            bars_received: self.shared.bars_received.load(Ordering::Relaxed),
            errors_received: self.shared.errors_received.load(Ordering::Relaxed),
        }
    }
}
