//! Proxy Manager - Proxy Registry and Connectivity Checker
//!
//! Keeps a persisted list of upstream proxies and checks whether a
//! selected proxy can carry an HTTP request.

pub mod error;
pub mod logging;
pub mod proxy;
pub mod tui;
pub mod tunnel;

pub use error::*;
pub use proxy::*;

use std::path::PathBuf;
use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Default registry file, relative to the working directory
pub const DEFAULT_STORAGE_PATH: &str = "proxies.json";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry file path
    pub storage_path: PathBuf,
    /// Settings for connectivity checks
    pub checker: CheckerConfig,
    /// Delay before a started tunnel reports as connected
    pub tunnel_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            checker: CheckerConfig::default(),
            tunnel_settle: tunnel::DEFAULT_SETTLE_DELAY,
        }
    }
}

impl Config {
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_checker(mut self, checker: CheckerConfig) -> Self {
        self.checker = checker;
        self
    }
}
