//! Contract Descriptors
//!
//! Instrument descriptions sent to the trading terminal. Only the fields
//! the historical-data request carries on the wire are modeled.

use std::fmt;

use serde::Serialize;

/// Security type of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SecurityType {
    /// Common stock or ETF.
    #[default]
    Stock,
    /// Foreign exchange pair.
    Cash,
    /// Cryptocurrency.
    Crypto,
    /// Future.
    Future,
    /// Option.
    Option,
    /// Index.
    Index,
}

impl SecurityType {
    /// Wire code used by the terminal.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "STK",
            Self::Cash => "CASH",
            Self::Crypto => "CRYPTO",
            Self::Future => "FUT",
            Self::Option => "OPT",
            Self::Index => "IND",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instrument descriptor.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Contract {
    /// Terminal contract id (0 when unknown).
    pub contract_id: i32,
    /// Ticker symbol.
    pub symbol: String,
    /// Security type.
    pub security_type: SecurityType,
    /// Expiry for derivatives (`YYYYMM` or `YYYYMMDD`).
    pub last_trade_date_or_contract_month: String,
    /// Option strike.
    pub strike: f64,
    /// Option right (`C` / `P`).
    pub right: String,
    /// Contract multiplier.
    pub multiplier: String,
    /// Routing exchange.
    pub exchange: String,
    /// Listing exchange, used to disambiguate `SMART` routed contracts.
    pub primary_exchange: String,
    /// Currency.
    pub currency: String,
    /// Local symbol.
    pub local_symbol: String,
    /// Trading class.
    pub trading_class: String,
}

impl Contract {
    fn with(symbol: &str, security_type: SecurityType, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            security_type,
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            ..Self::default()
        }
    }

    /// US stock listed on ARCA, routed directly.
    #[must_use]
    pub fn us_stock(symbol: &str) -> Self {
        Self::with(symbol, SecurityType::Stock, "ARCA", "USD")
    }

    /// US stock routed through SMART with an explicit primary exchange.
    #[must_use]
    pub fn us_stock_with_primary_exchange(symbol: &str, primary_exchange: &str) -> Self {
        Self {
            primary_exchange: primary_exchange.to_string(),
            ..Self::with(symbol, SecurityType::Stock, "SMART", "USD")
        }
    }

    /// US stock routed through SMART.
    #[must_use]
    pub fn us_stock_at_smart(symbol: &str) -> Self {
        Self::with(symbol, SecurityType::Stock, "SMART", "USD")
    }

    /// ETF routed through SMART.
    #[must_use]
    pub fn etf(symbol: &str) -> Self {
        Self::us_stock_at_smart(symbol)
    }

    /// ETH/USD on PAXOS.
    #[must_use]
    pub fn eth_usd_crypto() -> Self {
        Self::with("ETH", SecurityType::Crypto, "PAXOS", "USD")
    }

    /// EUR/GBP on IDEALPRO.
    #[must_use]
    pub fn eur_gbp_fx() -> Self {
        Self::with("EUR", SecurityType::Cash, "IDEALPRO", "GBP")
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}",
            self.symbol, self.security_type, self.exchange
        )?;
        if !self.primary_exchange.is_empty() {
            write!(f, " ({})", self.primary_exchange)?;
        }
        write!(f, " {}", self.currency)
    }
}
