//! Historical Data Types
//!
//! Request parameters and bar payloads for the terminal's historical data
//! service.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::contract::Contract;

/// Bar size setting accepted by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarSize {
    /// 1 second bars.
    Sec1,
    /// 5 second bars.
    Sec5,
    /// 1 minute bars.
    Min1,
    /// 5 minute bars.
    Min5,
    /// 15 minute bars.
    Min15,
    /// 1 hour bars.
    Hour1,
    /// 1 day bars.
    Day1,
    /// 1 week bars.
    Week1,
    /// 1 month bars.
    Month1,
}

impl BarSize {
    /// Wire value of the bar size.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sec1 => "1 secs",
            Self::Sec5 => "5 secs",
            Self::Min1 => "1 min",
            Self::Min5 => "5 mins",
            Self::Min15 => "15 mins",
            Self::Hour1 => "1 hour",
            Self::Day1 => "1 day",
            Self::Week1 => "1 week",
            Self::Month1 => "1 month",
        }
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price series the bars are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WhatToShow {
    /// Trade prices.
    Trades,
    /// Bid/ask midpoint.
    Midpoint,
    /// Bid prices.
    Bid,
    /// Ask prices.
    Ask,
    /// Adjusted trade prices.
    AdjustedLast,
}

impl WhatToShow {
    /// Wire value of the data type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trades => "TRADES",
            Self::Midpoint => "MIDPOINT",
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::AdjustedLast => "ADJUSTED_LAST",
        }
    }
}

impl fmt::Display for WhatToShow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Historical data request for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalDataRequest {
    /// Request id, unique per session.
    pub request_id: i32,
    /// Instrument.
    pub contract: Contract,
    /// End of the window, e.g. `20240519 23:59:59 US/Eastern`. Empty means now.
    pub end_date_time: String,
    /// Window length, e.g. `10 D`.
    pub duration: String,
    /// Bar size.
    pub bar_size: BarSize,
    /// Price series.
    pub what_to_show: WhatToShow,
    /// Only regular trading hours (1) or all hours (0).
    pub use_rth: i32,
    /// 1 for `yyyyMMdd HH:mm:ss` dates, 2 for epoch seconds.
    pub format_date: i32,
    /// Keep streaming updates after the snapshot.
    pub keep_up_to_date: bool,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    /// Bar time as formatted by the terminal.
    pub time: String,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Volume.
    pub volume: Decimal,
    /// Volume weighted average price.
    pub wap: Decimal,
    /// Number of trades in the bar.
    pub count: i32,
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} o={} h={} l={} c={} v={} wap={} n={}",
            self.time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.wap,
            self.count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_size_wire_values() {
        assert_eq!(BarSize::Day1.as_str(), "1 day");
        assert_eq!(BarSize::Min5.as_str(), "5 mins");
        assert_eq!(BarSize::Hour1.to_string(), "1 hour");
    }

    #[test]
    fn what_to_show_wire_values() {
        assert_eq!(WhatToShow::Trades.as_str(), "TRADES");
        assert_eq!(WhatToShow::AdjustedLast.to_string(), "ADJUSTED_LAST");
    }
}
