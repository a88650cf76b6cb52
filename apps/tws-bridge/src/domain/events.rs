//! Terminal Events
//!
//! Everything a terminal session reports to its listeners.

use std::fmt;

use serde::Serialize;

use super::historical::Bar;

/// Request id the terminal uses for messages not tied to a request.
pub const NO_REQUEST_ID: i32 = -1;

/// Connection state of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket open, handshake in progress.
    Connecting,
    /// Handshake complete and next valid id received.
    Connected,
}

impl ConnectionState {
    /// Lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// Check if the session is ready for requests.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the terminal through an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalError {
    /// Request the error refers to, or [`NO_REQUEST_ID`].
    pub request_id: i32,
    /// Terminal error code.
    pub code: i32,
    /// Human readable message.
    pub message: String,
}

impl TerminalError {
    /// Notices that are not failures: farm status (2100-2169) and
    /// connectivity restored (1101, 1102).
    #[must_use]
    pub const fn is_informational(&self) -> bool {
        matches!(self.code, 1101 | 1102) || (self.code >= 2100 && self.code < 2170)
    }

    /// Errors that mean the session itself is unusable.
    ///
    /// 502: couldn't connect, 504: not connected, 1100: connectivity lost,
    /// 1300: socket port reset. Any non-informational error without a
    /// request id is treated the same way.
    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        if self.is_informational() {
            return false;
        }
        matches!(self.code, 502 | 504 | 1100 | 1300) || self.request_id == NO_REQUEST_ID
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "terminal error {} (request {}): {}",
            self.code, self.request_id, self.message
        )
    }
}

/// Event emitted by a terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Handshake complete, session ready.
    Connected {
        /// Negotiated server version.
        server_version: i32,
    },
    /// Session closed.
    Disconnected,
    /// Next valid order id announced by the terminal.
    NextValidId(i32),
    /// Comma separated accounts managed by this login.
    ManagedAccounts(Vec<String>),
    /// One bar of a historical snapshot.
    HistoricalData {
        /// Request the bar belongs to.
        request_id: i32,
        /// The bar.
        bar: Bar,
    },
    /// End of a historical snapshot.
    HistoricalDataEnd {
        /// Request that finished.
        request_id: i32,
        /// Window start as reported by the terminal.
        start: String,
        /// Window end as reported by the terminal.
        end: String,
    },
    /// Live update of the latest bar of a kept-up-to-date request.
    HistoricalDataUpdate {
        /// Request the bar belongs to.
        request_id: i32,
        /// The bar.
        bar: Bar,
    },
    /// Error message.
    Error(TerminalError),
}

impl TerminalEvent {
    /// Short name used for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::NextValidId(_) => "next_valid_id",
            Self::ManagedAccounts(_) => "managed_accounts",
            Self::HistoricalData { .. } => "historical_data",
            Self::HistoricalDataEnd { .. } => "historical_data_end",
            Self::HistoricalDataUpdate { .. } => "historical_data_update",
            Self::Error(_) => "error",
        }
    }

    /// Request id the event refers to, if any.
    #[must_use]
    pub const fn request_id(&self) -> Option<i32> {
        match self {
            Self::HistoricalData { request_id, .. }
            | Self::HistoricalDataEnd { request_id, .. }
            | Self::HistoricalDataUpdate { request_id, .. } => Some(*request_id),
            Self::Error(error) if error.request_id != NO_REQUEST_ID => Some(error.request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(request_id: i32, code: i32) -> TerminalError {
        TerminalError {
            request_id,
            code,
            message: "msg".to_string(),
        }
    }

    #[test]
    fn farm_status_is_informational() {
        let farm = error(NO_REQUEST_ID, 2104);
        assert!(farm.is_informational());
        assert!(!farm.is_connection_level());
    }

    #[test]
    fn connectivity_restored_is_a_notice() {
        for code in [1101, 1102] {
            let restored = error(NO_REQUEST_ID, code);
            assert!(restored.is_informational());
            assert!(!restored.is_connection_level());
        }
    }

    #[test]
    fn connection_level_errors() {
        assert!(error(NO_REQUEST_ID, 502).is_connection_level());
        assert!(error(NO_REQUEST_ID, 1100).is_connection_level());
        assert!(error(NO_REQUEST_ID, 321).is_connection_level());
        assert!(!error(1, 162).is_connection_level());
    }

    #[test]
    fn request_id_of_events() {
        assert_eq!(TerminalEvent::Error(error(1, 162)).request_id(), Some(1));
        assert_eq!(
            TerminalEvent::Error(error(NO_REQUEST_ID, 2104)).request_id(),
            None
        );
        assert_eq!(TerminalEvent::NextValidId(7).request_id(), None);
    }

    #[test]
    fn connection_state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::Connected.is_connected());
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"connecting\""
        );
    }
}
