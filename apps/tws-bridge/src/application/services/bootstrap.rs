//! Session Bootstrap
//!
//! Connects a terminal session, waits until it is ready and issues the one
//! historical data request the service exists for.
//!
//! # Flow
//!
//! 1. Start a listener that logs every terminal event and tears the
//!    session down on any error that is not a notice.
//! 2. Connect.
//! 3. Wait for readiness, logging progress every second.
//! 4. Send the request and wait, for a bounded time, for the terminal's
//!    answer.
//!
//! The listener runs until [`Bootstrapper::shutdown`] is called or the
//! bootstrapper is dropped.
//!
//! Failures after the connect step are reported through [`RequestOutcome`]
//! rather than as errors. Nothing is retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SessionError, TerminalSession};
use crate::domain::contract::Contract;
use crate::domain::events::{ConnectionState, TerminalEvent};
use crate::domain::historical::{BarSize, HistoricalDataRequest, WhatToShow};

/// Request id of the bootstrap request.
pub const BOOTSTRAP_REQUEST_ID: i32 = 1;

/// Interval between "not connected yet" progress logs.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the terminal to answer the request.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// The fixed request: ten daily SPY trade bars ending 2024-05-19.
#[must_use]
pub fn bootstrap_request() -> HistoricalDataRequest {
    HistoricalDataRequest {
        request_id: BOOTSTRAP_REQUEST_ID,
        contract: Contract::us_stock_with_primary_exchange("SPY", "ARCA"),
        end_date_time: "20240519 23:59:59 US/Eastern".to_string(),
        duration: "10 D".to_string(),
        bar_size: BarSize::Day1,
        what_to_show: WhatToShow::Trades,
        use_rth: 1,
        format_date: 1,
        keep_up_to_date: false,
    }
}

// =============================================================================
// Outcome and Errors
// =============================================================================

/// Result of issuing the bootstrap request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The terminal accepted the request and delivered its snapshot.
    Issued {
        /// Request id.
        request_id: i32,
        /// Bars received before the end marker.
        bars: usize,
    },
    /// The session was not connected, or dropped before answering.
    NotConnected,
    /// The request went out but the terminal did not finish answering in
    /// time.
    NoAnswer {
        /// Request id.
        request_id: i32,
        /// Bars received before giving up.
        bars: usize,
    },
    /// The terminal answered the request with an error.
    Rejected {
        /// Request id.
        request_id: i32,
        /// Terminal error code.
        code: i32,
        /// Terminal error message.
        message: String,
    },
}

impl RequestOutcome {
    /// Check if the request went through.
    #[must_use]
    pub const fn is_issued(&self) -> bool {
        matches!(self, Self::Issued { .. })
    }
}

/// Errors returned by [`Bootstrapper::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    /// The session could not be opened.
    #[error("terminal connection failed: {0}")]
    Connect(#[source] SessionError),

    /// `initialize` already ran on this bootstrapper.
    #[error("bootstrap already ran")]
    AlreadyInitialized,
}

// =============================================================================
// Bootstrapper
// =============================================================================

/// Bootstrap settings.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    /// Request issued once the session is ready.
    pub request: HistoricalDataRequest,
    /// Progress log interval while waiting for readiness.
    pub progress_interval: Duration,
    /// Upper bound on the wait for the request's answer.
    pub response_timeout: Duration,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            request: bootstrap_request(),
            progress_interval: PROGRESS_INTERVAL,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// Runs the one-shot bootstrap against an injected session.
pub struct Bootstrapper {
    session: Arc<dyn TerminalSession>,
    settings: BootstrapSettings,
    started: AtomicBool,
    listener: CancellationToken,
}

impl Bootstrapper {
    /// Create a bootstrapper for a session.
    #[must_use]
    pub fn new(session: Arc<dyn TerminalSession>, settings: BootstrapSettings) -> Self {
        Self {
            session,
            settings,
            started: AtomicBool::new(false),
            listener: CancellationToken::new(),
        }
    }

    /// Stop the event listener started by [`Self::initialize`].
    pub fn shutdown(&self) {
        self.listener.cancel();
    }

    /// The session this bootstrapper drives.
    #[must_use]
    pub fn session(&self) -> Arc<dyn TerminalSession> {
        Arc::clone(&self.session)
    }

    /// Connect, wait until ready and issue the request once.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::Connect` if the session cannot be opened and
    /// `BootstrapError::AlreadyInitialized` on a second call.
    pub async fn initialize(&self) -> Result<RequestOutcome, BootstrapError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BootstrapError::AlreadyInitialized);
        }

        spawn_event_listener(Arc::clone(&self.session), self.listener.clone());

        tracing::info!("Connecting to trading terminal");
        self.session
            .connect()
            .await
            .map_err(BootstrapError::Connect)?;

        let mut state = self.session.watch_state();
        match wait_until_connected(&mut state, self.settings.progress_interval).await {
            Ok(seconds_waited) => {
                tracing::info!(seconds_waited, "Terminal connected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Terminal session closed before it was ready");
                return Ok(RequestOutcome::NotConnected);
            }
        }

        let outcome = self.issue_request().await;
        match &outcome {
            RequestOutcome::Issued { request_id, bars } => {
                tracing::info!(request_id, bars, "Historical data request completed");
            }
            RequestOutcome::NotConnected => {
                tracing::warn!("Historical data request not issued: terminal not connected");
            }
            RequestOutcome::NoAnswer { request_id, bars } => {
                tracing::warn!(
                    request_id,
                    bars,
                    timeout_secs = self.settings.response_timeout.as_secs_f64(),
                    "Terminal did not answer the historical data request in time"
                );
            }
            RequestOutcome::Rejected {
                request_id,
                code,
                message,
            } => {
                tracing::error!(request_id, code, %message, "Historical data request rejected");
            }
        }
        Ok(outcome)
    }

    async fn issue_request(&self) -> RequestOutcome {
        let request = &self.settings.request;
        // subscribe before sending so the answer cannot be missed
        let responses = self.session.subscribe();

        tracing::info!(
            request_id = request.request_id,
            contract = %request.contract,
            end = %request.end_date_time,
            duration = %request.duration,
            bar_size = %request.bar_size,
            what_to_show = %request.what_to_show,
            "Requesting historical data"
        );

        if let Err(e) = self.session.request_historical_data(request).await {
            tracing::error!(error = %e, "Failed to send historical data request");
            return RequestOutcome::NotConnected;
        }

        await_response(responses, request.request_id, self.settings.response_timeout).await
    }
}

impl Drop for Bootstrapper {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

/// Wait until `state` reports a connected session.
///
/// Logs a progress message every `period` while waiting and stops as soon
/// as the state settles. Returns the number of progress ticks.
///
/// # Errors
///
/// Returns `SessionError::NotConnected` if the session goes back to
/// `Disconnected` (or its state channel closes) instead.
pub async fn wait_until_connected(
    state: &mut watch::Receiver<ConnectionState>,
    period: Duration,
) -> Result<u32, SessionError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let settled = state.wait_for(|s| *s != ConnectionState::Connecting);
    tokio::pin!(settled);

    let mut ticks = 0_u32;
    let settled_state = loop {
        tokio::select! {
            biased;
            result = &mut settled => break result.map(|s| *s),
            _ = ticker.tick() => {
                ticks += 1;
                tracing::info!(seconds_waited = ticks, "Terminal not connected yet");
            }
        }
    };

    match settled_state {
        Ok(ConnectionState::Connected) => Ok(ticks),
        _ => Err(SessionError::NotConnected),
    }
}

async fn await_response(
    mut responses: broadcast::Receiver<TerminalEvent>,
    request_id: i32,
    timeout: Duration,
) -> RequestOutcome {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut bars = 0_usize;
    loop {
        let received = tokio::select! {
            received = responses.recv() => received,
            () = &mut deadline => return RequestOutcome::NoAnswer { request_id, bars },
        };
        match received {
            Ok(TerminalEvent::HistoricalData { request_id: id, .. }) if id == request_id => {
                bars += 1;
            }
            Ok(TerminalEvent::HistoricalDataEnd { request_id: id, .. }) if id == request_id => {
                return RequestOutcome::Issued { request_id, bars };
            }
            Ok(TerminalEvent::Error(error))
                if error.request_id == request_id && !error.is_informational() =>
            {
                return RequestOutcome::Rejected {
                    request_id,
                    code: error.code,
                    message: error.message,
                };
            }
            Ok(TerminalEvent::Disconnected) | Err(RecvError::Closed) => {
                return RequestOutcome::NotConnected;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Response listener lagged behind terminal events");
            }
        }
    }
}

// =============================================================================
// Event Listener
// =============================================================================

/// Log every terminal event until `cancel` fires; disconnect on errors.
fn spawn_event_listener(
    session: Arc<dyn TerminalSession>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => received,
            };
            match received {
                Ok(event) => handle_event(session.as_ref(), event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener lagged behind terminal events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Event listener stopped");
    })
}

async fn handle_event(session: &dyn TerminalSession, event: TerminalEvent) {
    match event {
        TerminalEvent::Connected { server_version } => {
            tracing::info!(server_version, "Terminal session ready");
        }
        TerminalEvent::Disconnected => {
            tracing::warn!("Terminal session closed");
        }
        TerminalEvent::NextValidId(order_id) => {
            tracing::info!(order_id, "Next valid order id");
        }
        TerminalEvent::ManagedAccounts(accounts) => {
            tracing::info!(accounts = %accounts.join(","), "Managed accounts");
        }
        TerminalEvent::HistoricalData { request_id, bar } => {
            tracing::info!(request_id, %bar, "Historical bar");
        }
        TerminalEvent::HistoricalDataEnd {
            request_id,
            start,
            end,
        } => {
            tracing::info!(request_id, %start, %end, "Historical data end");
        }
        TerminalEvent::HistoricalDataUpdate { request_id, bar } => {
            tracing::info!(request_id, %bar, "Historical bar update");
        }
        TerminalEvent::Error(error) if error.is_informational() => {
            tracing::info!(code = error.code, message = %error.message, "Terminal notice");
        }
        TerminalEvent::Error(error) => {
            tracing::error!(
                request_id = error.request_id,
                code = error.code,
                message = %error.message,
                connection_level = error.is_connection_level(),
                "Terminal error, closing session"
            );
            session.disconnect().await;
        }
    }
}
