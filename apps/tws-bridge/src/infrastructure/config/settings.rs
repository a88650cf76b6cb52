//! Bridge Configuration Settings
//!
//! Configuration types for the bridge, resolved from environment variables.

use std::fmt;

/// Client id used when `CLIENT_ID` is unset, zero or has no leading integer.
pub const DEFAULT_CLIENT_ID: i32 = 999;

/// Terminal host used when `TWS_HOST` is unset.
pub const DEFAULT_HOST: &str = "localhost";

/// HTTP listen port used when `HTTP_PORT` is unset.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Trading terminal application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// Trader Workstation.
    #[default]
    Tws,
    /// IB Gateway.
    Gateway,
}

impl Platform {
    /// Parse a platform name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unknown names.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "tws" => Ok(Self::Tws),
            "gateway" | "ibgw" | "ib" => Ok(Self::Gateway),
            _ => Err(ConfigError::InvalidValue {
                key: "TWS_PLATFORM".to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Get the platform name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tws => "tws",
            Self::Gateway => "gateway",
        }
    }
}

/// Trading mode (paper vs live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingMode {
    /// Paper trading account.
    #[default]
    Paper,
    /// Live trading account.
    Live,
}

impl TradingMode {
    /// Parse a trading mode.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything but paper or live.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "paper" => Ok(Self::Paper),
            "live" => Ok(Self::Live),
            _ => Err(ConfigError::InvalidValue {
                key: "TWS_TRADING_MODE".to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Check if this is the live mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

/// Environment variable holding the port for a platform and mode.
#[must_use]
pub const fn port_env_var(platform: Platform, mode: TradingMode) -> &'static str {
    match (platform, mode) {
        (Platform::Tws, TradingMode::Paper) => "TWS_PAPER_PORT",
        (Platform::Tws, TradingMode::Live) => "TWS_LIVE_PORT",
        (Platform::Gateway, TradingMode::Paper) => "IBGW_PAPER_PORT",
        (Platform::Gateway, TradingMode::Live) => "IBGW_LIVE_PORT",
    }
}

/// Trading terminal connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSettings {
    /// Terminal host.
    pub host: String,
    /// Terminal API port.
    pub port: u16,
    /// Client id for the API session.
    pub client_id: i32,
    /// Terminal application.
    pub platform: Platform,
    /// Trading mode.
    pub trading_mode: TradingMode,
}

impl fmt::Display for TerminalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Listen port.
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Terminal connection settings.
    pub terminal: TerminalSettings,
    /// HTTP server settings.
    pub http: HttpSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform or trading mode is unknown, or if
    /// the selected terminal port (or `HTTP_PORT`) is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let platform = lookup("TWS_PLATFORM")
            .map(|v| Platform::parse(&v))
            .transpose()?
            .unwrap_or_default();

        let trading_mode = lookup("TWS_TRADING_MODE")
            .map(|v| TradingMode::parse(&v))
            .transpose()?
            .unwrap_or_default();

        let port_key = port_env_var(platform, trading_mode);
        let port_value =
            lookup(port_key).ok_or_else(|| ConfigError::MissingEnvVar(port_key.to_string()))?;
        let port = parse_port(port_key, &port_value)?;

        let client_id = lookup("CLIENT_ID")
            .and_then(|v| parse_client_id(&v))
            .unwrap_or(DEFAULT_CLIENT_ID);

        let host = lookup("TWS_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let http = match lookup("HTTP_PORT") {
            Some(value) => HttpSettings {
                port: parse_port("HTTP_PORT", &value)?,
            },
            None => HttpSettings::default(),
        };

        Ok(Self {
            terminal: TerminalSettings {
                host,
                port,
                client_id,
                platform,
                trading_mode,
            },
            http,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Leading integer of `value` (`"42abc"` is 42), or `None` when there is
/// none or it is zero.
fn parse_client_id(value: &str) -> Option<i32> {
    let value = value.trim_start();
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let digits = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let sign_len = value.len() - unsigned.len();
    value[..sign_len + digits]
        .parse::<i32>()
        .ok()
        .filter(|id| *id != 0)
}
