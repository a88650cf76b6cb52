//! Application Services
//!
//! - **bootstrap**: connect the terminal session and issue the startup
//!   historical data request

pub mod bootstrap;

pub use bootstrap::{
    BOOTSTRAP_REQUEST_ID, BootstrapError, BootstrapSettings, Bootstrapper, RESPONSE_TIMEOUT,
    RequestOutcome, bootstrap_request, wait_until_connected,
};
