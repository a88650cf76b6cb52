//! TWS Field Codec
//!
//! The terminal speaks length-prefixed frames whose payload is a run of
//! NUL-terminated text fields. Framing is delegated to
//! [`LengthDelimitedCodec`]; this module builds and parses the payloads.
//!
//! # Handshake
//!
//! ```text
//! client -> "API\0"
//! client -> [len]["v100..176"]
//! server -> [len]["176\0" "20240520 09:30:00 EST\0"]
//! client -> [len]["71\0" "2\0" "<client id>\0" "\0"]
//! ```

use std::str::FromStr;

use rust_decimal::Decimal;
use tokio_util::bytes::Bytes;
use tokio_util::codec::LengthDelimitedCodec;

/// Raw prefix sent before the first frame.
pub const API_PREFIX: &[u8] = b"API\0";

/// Lowest protocol version this client accepts.
pub const MIN_CLIENT_VERSION: i32 = 100;

/// Highest protocol version this client understands.
pub const MAX_CLIENT_VERSION: i32 = 176;

/// Largest frame accepted from the terminal.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

const FIELD_SEPARATOR: u8 = 0;

/// Field decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Message ended before a required field.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field is not valid UTF-8.
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// Field could not be parsed into the expected type.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Frame codec for the terminal socket.
#[must_use]
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Version range announced right after [`API_PREFIX`].
#[must_use]
pub fn version_range() -> Bytes {
    Bytes::from(format!("v{MIN_CLIENT_VERSION}..{MAX_CLIENT_VERSION}"))
}

// =============================================================================
// Writing
// =============================================================================

/// Builds a message payload field by field.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(FIELD_SEPARATOR);
        self
    }

    /// Append an integer field.
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        self.push_str(&value.to_string())
    }

    /// Append a boolean as `1` / `0`.
    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push_str(if value { "1" } else { "0" })
    }

    /// Append a floating point field.
    pub fn push_f64(&mut self, value: f64) -> &mut Self {
        self.push_str(&value.to_string())
    }

    /// Finish the payload.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Reads fields from a received payload in order.
#[derive(Debug)]
pub struct FieldReader<'a> {
    fields: std::slice::Split<'a, u8, fn(&u8) -> bool>,
}

impl<'a> FieldReader<'a> {
    /// Start reading a payload.
    #[must_use]
    pub fn new(payload: &'a [u8]) -> Self {
        let payload = payload.strip_suffix(&[FIELD_SEPARATOR]).unwrap_or(payload);
        let is_separator: fn(&u8) -> bool = |b| *b == FIELD_SEPARATOR;
        Self {
            fields: payload.split(is_separator),
        }
    }

    /// Next field as text.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the field is missing or not UTF-8.
    pub fn next_str(&mut self, field: &'static str) -> Result<&'a str, DecodeError> {
        let raw = self.fields.next().ok_or(DecodeError::MissingField(field))?;
        std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    /// Next field as an owned string.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the field is missing or not UTF-8.
    pub fn next_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        self.next_str(field).map(str::to_string)
    }

    /// Next field as an integer. An empty field reads as 0.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the field is missing or not an integer.
    pub fn next_int(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        let raw = self.next_str(field)?;
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse().map_err(|_| DecodeError::InvalidValue {
            field,
            value: raw.to_string(),
        })
    }

    /// Next field as a decimal. An empty field reads as 0.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the field is missing or not numeric.
    pub fn next_decimal(&mut self, field: &'static str) -> Result<Decimal, DecodeError> {
        let raw = self.next_str(field)?;
        if raw.is_empty() {
            return Ok(Decimal::ZERO);
        }
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map_err(|_| DecodeError::InvalidValue {
                field,
                value: raw.to_string(),
            })
    }

    /// Skip a field whose value is not needed.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MissingField` if the payload has ended.
    pub fn skip(&mut self, field: &'static str) -> Result<(), DecodeError> {
        self.fields
            .next()
            .map(|_| ())
            .ok_or(DecodeError::MissingField(field))
    }
}
