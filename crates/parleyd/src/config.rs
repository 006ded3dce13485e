//! Server configuration.
//!
//! The listen address is resolved in three layers, later ones winning:
//! 1. `DEFAULT_ADDR`
//! 2. The `PARLEY_ADDR` environment variable
//! 3. The `--addr` command-line flag

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

use parley_protocol::DEFAULT_PORT;

// ============================================================================
// Configuration
// ============================================================================

/// Environment variable overriding the listen address.
pub const ADDR_ENV: &str = "PARLEY_ADDR";

/// Address the relay listens on when nothing else is configured.
pub const DEFAULT_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

/// Configuration for the relay server.
///
/// # Example
///
/// ```rust
/// use parleyd::config::ServerConfig;
///
/// let config = ServerConfig::default().with_addr_override(Some("0.0.0.0:4000")).unwrap();
/// assert_eq!(config.addr.port(), 4000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: DEFAULT_ADDR }
    }
}

impl ServerConfig {
    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddr` if `PARLEY_ADDR` is set but is not
    /// a socket address.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_addr_override(lookup(ADDR_ENV).as_deref())
    }

    /// Replaces the address if `addr` is given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddr` if `addr` does not parse.
    pub fn with_addr_override(self, addr: Option<&str>) -> Result<Self, ConfigError> {
        match addr {
            Some(raw) => Ok(Self {
                addr: parse_addr(raw)?,
            }),
            None => Ok(self),
        }
    }
}

/// Parses `host:port` into a socket address.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAddr` carrying the offending input.
pub fn parse_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    let trimmed = raw.trim();
    trimmed.parse().map_err(|_| ConfigError::InvalidAddr {
        value: trimmed.to_string(),
    })
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from resolving configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{value}' (expected host:port)")]
    InvalidAddr { value: String },
}
