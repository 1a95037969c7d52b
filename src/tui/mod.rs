//! TUI module for terminal user interfaces

mod proxy_manager;

pub use proxy_manager::{Message, ProxyManagerApp};
