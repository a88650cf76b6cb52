//! TWS Messages
//!
//! Encoders for the requests this service sends and decoders for the
//! messages it understands. Layouts follow the negotiated server version;
//! fields gated on versions below [`MIN_CLIENT_VERSION`] are always present.
//!
//! [`MIN_CLIENT_VERSION`]: super::codec::MIN_CLIENT_VERSION

use tokio_util::bytes::Bytes;

use super::codec::{DecodeError, FieldReader, FieldWriter};
use crate::domain::events::{TerminalError, TerminalEvent};
use crate::domain::historical::{Bar, HistoricalDataRequest};

/// Server version from which historical requests drop the version field
/// and carry `keepUpToDate`.
pub const MIN_SERVER_VER_SYNT_REALTIME_BARS: i32 = 124;

/// Server version from which error messages carry the advanced reject JSON.
pub const MIN_SERVER_VER_ADVANCED_ORDER_REJECT: i32 = 166;

/// Outgoing message ids.
pub mod outgoing {
    /// Request historical bars.
    pub const REQ_HISTORICAL_DATA: i32 = 20;
    /// Cancel a historical bars request.
    pub const CANCEL_HISTORICAL_DATA: i32 = 25;
    /// Start the API session.
    pub const START_API: i32 = 71;
}

/// Incoming message ids.
pub mod incoming {
    /// Error or notice.
    pub const ERR_MSG: i32 = 4;
    /// Next valid order id.
    pub const NEXT_VALID_ID: i32 = 9;
    /// Managed accounts.
    pub const MANAGED_ACCTS: i32 = 15;
    /// Historical bars snapshot.
    pub const HISTORICAL_DATA: i32 = 17;
    /// Historical bar update.
    pub const HISTORICAL_DATA_UPDATE: i32 = 90;
}

// =============================================================================
// Handshake
// =============================================================================

/// Server greeting received after the version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Negotiated protocol version.
    pub server_version: i32,
    /// Terminal-local connection time, e.g. `20240520 09:30:00 EST`.
    pub connection_time: String,
}

/// Decode the server greeting.
///
/// # Errors
///
/// Returns `DecodeError` if the greeting is malformed.
pub fn decode_server_hello(payload: &[u8]) -> Result<ServerHello, DecodeError> {
    let mut reader = FieldReader::new(payload);
    let server_version = reader.next_int("server_version")?;
    let connection_time = reader.next_string("connection_time").unwrap_or_default();
    Ok(ServerHello {
        server_version,
        connection_time,
    })
}

/// Encode the `START_API` message.
#[must_use]
pub fn encode_start_api(client_id: i32) -> Bytes {
    const VERSION: i32 = 2;
    let mut writer = FieldWriter::new();
    writer
        .push_int(outgoing::START_API)
        .push_int(VERSION)
        .push_int(client_id)
        .push_str("");
    writer.into_bytes()
}

// =============================================================================
// Requests
// =============================================================================

/// Encode a historical data request.
#[must_use]
pub fn encode_historical_request(request: &HistoricalDataRequest, server_version: i32) -> Bytes {
    const VERSION: i32 = 6;
    let contract = &request.contract;
    let mut writer = FieldWriter::new();

    writer.push_int(outgoing::REQ_HISTORICAL_DATA);
    if server_version < MIN_SERVER_VER_SYNT_REALTIME_BARS {
        writer.push_int(VERSION);
    }
    writer
        .push_int(request.request_id)
        .push_int(contract.contract_id)
        .push_str(&contract.symbol)
        .push_str(contract.security_type.as_str())
        .push_str(&contract.last_trade_date_or_contract_month)
        .push_f64(contract.strike)
        .push_str(&contract.right)
        .push_str(&contract.multiplier)
        .push_str(&contract.exchange)
        .push_str(&contract.primary_exchange)
        .push_str(&contract.currency)
        .push_str(&contract.local_symbol)
        .push_str(&contract.trading_class)
        .push_bool(false) // include expired
        .push_str(&request.end_date_time)
        .push_str(request.bar_size.as_str())
        .push_str(&request.duration)
        .push_int(request.use_rth)
        .push_str(request.what_to_show.as_str())
        .push_int(request.format_date);
    if server_version >= MIN_SERVER_VER_SYNT_REALTIME_BARS {
        writer.push_bool(request.keep_up_to_date);
    }
    writer.push_str(""); // chart options
    writer.into_bytes()
}

/// Encode a historical data cancellation.
#[must_use]
pub fn encode_cancel_historical(request_id: i32) -> Bytes {
    const VERSION: i32 = 1;
    let mut writer = FieldWriter::new();
    writer
        .push_int(outgoing::CANCEL_HISTORICAL_DATA)
        .push_int(VERSION)
        .push_int(request_id);
    writer.into_bytes()
}

// =============================================================================
// Incoming
// =============================================================================

/// Decode one incoming message into zero or more events.
///
/// Unknown message ids decode to no events.
///
/// # Errors
///
/// Returns `DecodeError` if a known message is malformed.
pub fn decode_message(
    payload: &[u8],
    server_version: i32,
) -> Result<Vec<TerminalEvent>, DecodeError> {
    let mut reader = FieldReader::new(payload);
    let message_id = reader.next_int("message_id")?;

    match message_id {
        incoming::ERR_MSG => decode_error(&mut reader, server_version).map(|e| vec![e]),
        incoming::NEXT_VALID_ID => {
            reader.skip("version")?;
            let order_id = reader.next_int("order_id")?;
            Ok(vec![TerminalEvent::NextValidId(order_id)])
        }
        incoming::MANAGED_ACCTS => {
            reader.skip("version")?;
            let accounts = reader
                .next_str("accounts")?
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            Ok(vec![TerminalEvent::ManagedAccounts(accounts)])
        }
        incoming::HISTORICAL_DATA => decode_historical_data(&mut reader, server_version),
        incoming::HISTORICAL_DATA_UPDATE => decode_historical_update(&mut reader),
        other => {
            tracing::trace!(message_id = other, "Ignoring unhandled terminal message");
            Ok(Vec::new())
        }
    }
}

fn decode_error(
    reader: &mut FieldReader<'_>,
    server_version: i32,
) -> Result<TerminalEvent, DecodeError> {
    reader.skip("version")?;
    let request_id = reader.next_int("request_id")?;
    let code = reader.next_int("error_code")?;
    let message = reader.next_string("error_message")?;
    if server_version >= MIN_SERVER_VER_ADVANCED_ORDER_REJECT {
        // advanced order reject JSON, absent on some builds
        let _ = reader.skip("advanced_order_reject");
    }
    Ok(TerminalEvent::Error(TerminalError {
        request_id,
        code,
        message,
    }))
}

fn decode_historical_data(
    reader: &mut FieldReader<'_>,
    server_version: i32,
) -> Result<Vec<TerminalEvent>, DecodeError> {
    if server_version < MIN_SERVER_VER_SYNT_REALTIME_BARS {
        reader.skip("version")?;
    }
    let request_id = reader.next_int("request_id")?;
    let start = reader.next_string("start")?;
    let end = reader.next_string("end")?;
    let item_count = reader.next_int("item_count")?;

    // item_count comes off the wire; grow as bars actually decode
    let mut events = Vec::new();
    for _ in 0..item_count {
        let time = reader.next_string("date")?;
        let open = reader.next_decimal("open")?;
        let high = reader.next_decimal("high")?;
        let low = reader.next_decimal("low")?;
        let close = reader.next_decimal("close")?;
        let volume = reader.next_decimal("volume")?;
        let wap = reader.next_decimal("wap")?;
        if server_version < MIN_SERVER_VER_SYNT_REALTIME_BARS {
            reader.skip("has_gaps")?;
        }
        let count = reader.next_int("bar_count")?;
        events.push(TerminalEvent::HistoricalData {
            request_id,
            bar: Bar {
                time,
                open,
                high,
                low,
                close,
                volume,
                wap,
                count,
            },
        });
    }

    events.push(TerminalEvent::HistoricalDataEnd {
        request_id,
        start,
        end,
    });
    Ok(events)
}

fn decode_historical_update(reader: &mut FieldReader<'_>) -> Result<Vec<TerminalEvent>, DecodeError> {
    let request_id = reader.next_int("request_id")?;
    let count = reader.next_int("bar_count")?;
    let time = reader.next_string("date")?;
    let open = reader.next_decimal("open")?;
    let close = reader.next_decimal("close")?;
    let high = reader.next_decimal("high")?;
    let low = reader.next_decimal("low")?;
    let wap = reader.next_decimal("wap")?;
    let volume = reader.next_decimal("volume")?;

    Ok(vec![TerminalEvent::HistoricalDataUpdate {
        request_id,
        bar: Bar {
            time,
            open,
            high,
            low,
            close,
            volume,
            wap,
            count,
        },
    }])
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::contract::Contract;
    use crate::domain::historical::{BarSize, WhatToShow};

    fn fields(payload: &[u8]) -> Vec<String> {
        let payload = payload.strip_suffix(b"\0").unwrap_or(payload);
        payload
            .split(|b| *b == 0)
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    fn payload(fields: &[&str]) -> Vec<u8> {
        let mut writer = FieldWriter::new();
        for field in fields {
            writer.push_str(field);
        }
        writer.into_bytes().to_vec()
    }

    fn spy_request() -> HistoricalDataRequest {
        HistoricalDataRequest {
            request_id: 1,
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

    #[test]
    fn start_api_layout() {
        assert_eq!(fields(&encode_start_api(999)), ["71", "2", "999", ""]);
    }

    #[test]
    fn historical_request_layout_modern_server() {
        let encoded = encode_historical_request(&spy_request(), 176);
        assert_eq!(
            fields(&encoded),
            [
                "20",
                "1",
                "0",
                "SPY",
                "STK",
                "",
                "0",
                "",
                "",
                "SMART",
                "ARCA",
                "USD",
                "",
                "",
                "0",
                "20240519 23:59:59 US/Eastern",
                "1 day",
                "10 D",
                "1",
                "TRADES",
                "1",
                "0",
                "",
            ]
        );
    }

    #[test]
    fn historical_request_layout_older_server() {
        let encoded = fields(&encode_historical_request(&spy_request(), 110));
        assert_eq!(encoded[..3], ["20", "6", "1"]);
        // no keepUpToDate flag before the chart options
        assert_eq!(encoded.len(), 23);
        assert_eq!(encoded[21], "1");
    }

    #[test]
    fn cancel_layout() {
        assert_eq!(fields(&encode_cancel_historical(1)), ["25", "1", "1"]);
    }

    #[test]
    fn server_hello() {
        let hello = decode_server_hello(b"176\x0020240520 09:30:00 EST\x00").unwrap();
        assert_eq!(hello.server_version, 176);
        assert_eq!(hello.connection_time, "20240520 09:30:00 EST");
    }

    #[test]
    fn decode_next_valid_id_and_accounts() {
        let events = decode_message(&payload(&["9", "1", "42"]), 176).unwrap();
        assert_eq!(events, [TerminalEvent::NextValidId(42)]);

        let events = decode_message(&payload(&["15", "1", "DU111,DU222,"]), 176).unwrap();
        assert_eq!(
            events,
            [TerminalEvent::ManagedAccounts(vec![
                "DU111".to_string(),
                "DU222".to_string()
            ])]
        );
    }

    #[test]
    fn decode_error_with_reject_json() {
        let events = decode_message(
            &payload(&["4", "2", "1", "162", "Historical Market Data Service error", ""]),
            176,
        )
        .unwrap();
        assert_eq!(
            events,
            [TerminalEvent::Error(TerminalError {
                request_id: 1,
                code: 162,
                message: "Historical Market Data Service error".to_string(),
            })]
        );
    }

    #[test]
    fn decode_historical_snapshot() {
        let events = decode_message(
            &payload(&[
                "17",
                "1",
                "20240509  23:59:59",
                "20240519  23:59:59",
                "2",
                "20240516",
                "529.88",
                "531.52",
                "528.54",
                "528.69",
                "591234",
                "529.9",
                "301234",
                "20240517",
                "528.81",
                "529.52",
                "527.32",
                "529.45",
                "402312",
                "528.6",
                "250000",
            ]),
            176,
        )
        .unwrap();

        assert_eq!(events.len(), 3);
        match &events[0] {
            TerminalEvent::HistoricalData { request_id, bar } => {
                assert_eq!(*request_id, 1);
                assert_eq!(bar.time, "20240516");
                assert_eq!(bar.close, Decimal::new(52869, 2));
                assert_eq!(bar.count, 301_234);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            events[2],
            TerminalEvent::HistoricalDataEnd {
                request_id: 1,
                start: "20240509  23:59:59".to_string(),
                end: "20240519  23:59:59".to_string(),
            }
        );
    }

    #[test]
    fn decode_historical_update_field_order() {
        let events = decode_message(
            &payload(&[
                "90", "1", "120", "20240520", "530.1", "531.0", "532.5", "529.7", "530.6", "1000",
            ]),
            176,
        )
        .unwrap();

        match &events[0] {
            TerminalEvent::HistoricalDataUpdate { request_id, bar } => {
                assert_eq!(*request_id, 1);
                assert_eq!(bar.count, 120);
                assert_eq!(bar.open, Decimal::new(5301, 1));
                assert_eq!(bar.close, Decimal::new(531, 0));
                assert_eq!(bar.high, Decimal::new(5325, 1));
                assert_eq!(bar.low, Decimal::new(5297, 1));
                assert_eq!(bar.volume, Decimal::new(1000, 0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_messages_are_ignored() {
        assert!(decode_message(&payload(&["49", "1", "1716200000"]), 176)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn truncated_snapshot_is_an_error() {
        let result = decode_message(&payload(&["17", "1", "a", "b", "1", "20240516"]), 176);
        assert!(matches!(result, Err(DecodeError::MissingField("open"))));
    }

    #[test]
    fn oversized_bar_count_is_an_error() {
        let count = i32::MAX.to_string();
        let result = decode_message(&payload(&["17", "1", "a", "b", &count]), 176);
        assert!(matches!(result, Err(DecodeError::MissingField("date"))));
    }
}
