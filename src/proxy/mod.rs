//! Proxy module for managing and checking proxies
//!
//! This module provides functionality for:
//! - Validating and normalizing proxy entries (address, port, type)
//! - Keeping an ordered proxy list persisted as JSON
//! - Checking a single proxy with one HTTP request routed through it

pub mod checker;
pub mod models;
pub mod registry;

pub use checker::{CheckerConfig, ProbeResult, ProbeRoute, ProbeSuccess, ProxyChecker};
pub use models::{ProxyKind, ProxyRecord};
pub use registry::Registry;
