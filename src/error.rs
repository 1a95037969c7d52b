//! Error types for registry, probe and tunnel operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Rejected user input. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Address and port are required")]
    MissingAddressOrPort,

    #[error("Port must be a number")]
    InvalidPort,

    #[error("Port {0} is outside 1-65535")]
    PortOutOfRange(i64),

    #[error("Proxy type must be HTTP, SOCKS4 or SOCKS5")]
    InvalidKind,

    #[error("No proxy selected")]
    NoSelection,

    #[error("Proxy index {index} is out of range ({len} configured)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Storage failures of the registry file
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed proxy list in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Error from a registry mutation
///
/// `Persistence` means the change was applied in memory but could not be
/// written to storage.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Change kept in memory but not saved: {0}")]
    Persistence(#[from] PersistenceError),
}

impl RegistryError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }
}

/// Failure of a connectivity check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("Could not build request: {0}")]
    Client(String),

    #[error("A check is already in progress")]
    Busy,

    #[error("{0} proxies cannot be checked")]
    UnsupportedKind(String),
}

/// Failure of the tunnel platform seam
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("VPN permission is required to route traffic")]
    PermissionDenied,

    #[error("Already connected to {0}")]
    AlreadyActive(String),

    #[error("Tunnel failed: {0}")]
    Platform(String),
}
