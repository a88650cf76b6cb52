//! TWS Socket Adapter
//!
//! Implements the parts of the TWS API socket protocol this service needs:
//!
//! - **codec**: frame codec, handshake prefix, NUL-separated fields
//! - **messages**: request encoders and incoming message decoders
//! - **client**: the session (`TerminalSession` implementation)

pub mod client;
pub mod codec;
pub mod messages;

pub use client::{TwsClient, TwsClientConfig, TwsClientError};
pub use codec::{DecodeError, FieldReader, FieldWriter};
pub use messages::ServerHello;
