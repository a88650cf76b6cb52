//! Configuration Module
//!
//! Environment loading and settings resolution for the bridge.

mod settings;

pub use settings::{
    BridgeConfig, ConfigError, DEFAULT_CLIENT_ID, DEFAULT_HOST, DEFAULT_HTTP_PORT, HttpSettings,
    Platform, TerminalSettings, TradingMode, port_env_var,
};

/// Load a `.env` file from the current directory or the nearest ancestor
/// that has one. Variables already set in the process win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}
