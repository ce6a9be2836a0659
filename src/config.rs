//! Runtime configuration
//!
//! The bind address is taken from the first command line argument, then the
//! `RELAY_ADDR` environment variable, then [`DEFAULT_ADDR`].

use std::env;

/// Default server address
pub const DEFAULT_ADDR: &str = "0.0.0.0:3001";

/// Environment variable overriding the bind address
pub const ADDR_ENV: &str = "RELAY_ADDR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
}

impl Config {
    /// Resolve configuration from the process arguments and environment
    pub fn from_env() -> Self {
        Self::resolve(env::args().nth(1), env::var(ADDR_ENV).ok())
    }

    fn resolve(arg: Option<String>, env_addr: Option<String>) -> Self {
        let bind_addr = arg
            .or(env_addr)
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Self { bind_addr }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
        }
    }
}
