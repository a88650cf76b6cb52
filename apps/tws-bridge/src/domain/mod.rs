//! Domain Layer - Instrument and historical data types.
//!
//! Plain data types shared by the terminal client and the bootstrapper.

/// Contract descriptors and the instrument catalog.
pub mod contract;

/// Historical data requests and bars.
pub mod historical;

/// Events delivered by a terminal session.
pub mod events;
