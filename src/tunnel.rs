//! Tunnel platform seam and connection status
//!
//! Routing device traffic needs privileged host APIs. They sit behind
//! [`TunnelPlatform`]; this crate only ships [`SimulatedTunnel`], which
//! routes nothing.

use crate::error::TunnelError;
use crate::proxy::ProxyRecord;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Delay before a started simulated tunnel reports as connected
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Host operations needed to route traffic through a proxy
pub trait TunnelPlatform {
    /// Ask the host for permission to create a tunnel
    fn request_tunnel_permission(&mut self) -> bool;

    /// Start routing traffic through `proxy`
    fn start_tunnel(&mut self, proxy: &ProxyRecord) -> Result<(), TunnelError>;

    fn stop_tunnel(&mut self);
}

/// Platform stand-in that grants or denies permission and records state
#[derive(Debug, Default)]
pub struct SimulatedTunnel {
    deny_permission: bool,
    active: Option<ProxyRecord>,
}

impl SimulatedTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform on which the user refuses the permission prompt
    pub fn denying() -> Self {
        Self {
            deny_permission: true,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&ProxyRecord> {
        self.active.as_ref()
    }
}

impl TunnelPlatform for SimulatedTunnel {
    fn request_tunnel_permission(&mut self) -> bool {
        !self.deny_permission
    }

    fn start_tunnel(&mut self, proxy: &ProxyRecord) -> Result<(), TunnelError> {
        if let Some(active) = &self.active {
            return Err(TunnelError::AlreadyActive(active.address.clone()));
        }
        self.active = Some(proxy.clone());
        Ok(())
    }

    fn stop_tunnel(&mut self) {
        self.active = None;
    }
}

/// Connection state shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting { proxy: ProxyRecord, since: Instant },
    Connected { proxy: ProxyRecord },
}

impl ConnectionStatus {
    pub fn proxy(&self) -> Option<&ProxyRecord> {
        match self {
            ConnectionStatus::Disconnected => None,
            ConnectionStatus::Connecting { proxy, .. } | ConnectionStatus::Connected { proxy } => {
                Some(proxy)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting { proxy, .. } => {
                write!(f, "Connecting to {}...", proxy.address)
            }
            ConnectionStatus::Connected { proxy } => write!(f, "Connected to {}", proxy.address),
        }
    }
}

/// Drives a [`TunnelPlatform`] and tracks the resulting status
pub struct Connection<P: TunnelPlatform> {
    platform: P,
    settle: Duration,
    status: ConnectionStatus,
}

impl<P: TunnelPlatform> Connection<P> {
    pub fn new(platform: P, settle: Duration) -> Self {
        Self {
            platform,
            settle,
            status: ConnectionStatus::Disconnected,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Start connecting through `proxy`
    ///
    /// A previous connection is torn down first.
    pub fn connect(&mut self, proxy: &ProxyRecord, now: Instant) -> Result<(), TunnelError> {
        if !self.platform.request_tunnel_permission() {
            return Err(TunnelError::PermissionDenied);
        }
        if self.status.proxy().is_some() {
            self.disconnect();
        }

        self.platform.start_tunnel(proxy)?;
        info!(proxy = %proxy, "Tunnel starting");
        self.status = ConnectionStatus::Connecting {
            proxy: proxy.clone(),
            since: now,
        };
        Ok(())
    }

    /// Advance time; returns true when the connection just became established
    pub fn poll(&mut self, now: Instant) -> bool {
        let settled = match &self.status {
            ConnectionStatus::Connecting { since, .. } => now.duration_since(*since) >= self.settle,
            _ => false,
        };
        if !settled {
            return false;
        }

        if let ConnectionStatus::Connecting { proxy, .. } =
            std::mem::replace(&mut self.status, ConnectionStatus::Disconnected)
        {
            info!(proxy = %proxy, "Tunnel connected");
            self.status = ConnectionStatus::Connected { proxy };
        }
        true
    }

    pub fn disconnect(&mut self) {
        if let Some(proxy) = self.status.proxy() {
            info!(proxy = %proxy, "Tunnel stopped");
        }
        self.platform.stop_tunnel();
        self.status = ConnectionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyKind;

    fn proxy(address: &str) -> ProxyRecord {
        ProxyRecord::new(address, 8080, ProxyKind::Http)
    }

    #[test]
    fn test_connect_settles_after_delay() {
        let mut conn = Connection::new(SimulatedTunnel::new(), Duration::from_secs(2));
        let t0 = Instant::now();

        conn.connect(&proxy("10.0.0.1"), t0).unwrap();
        assert_eq!(conn.status().to_string(), "Connecting to 10.0.0.1...");
        assert!(conn.platform().active().is_some());

        assert!(!conn.poll(t0 + Duration::from_secs(1)));
        assert!(!conn.status().is_connected());

        assert!(conn.poll(t0 + Duration::from_secs(2)));
        assert_eq!(conn.status().to_string(), "Connected to 10.0.0.1");

        // Already connected: no second transition
        assert!(!conn.poll(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_permission_denied_stays_disconnected() {
        let mut conn = Connection::new(SimulatedTunnel::denying(), DEFAULT_SETTLE_DELAY);
        let err = conn.connect(&proxy("10.0.0.1"), Instant::now()).unwrap_err();
        assert_eq!(err, TunnelError::PermissionDenied);
        assert_eq!(*conn.status(), ConnectionStatus::Disconnected);
        assert!(conn.platform().active().is_none());
    }

    #[test]
    fn test_disconnect() {
        let mut conn = Connection::new(SimulatedTunnel::new(), Duration::ZERO);
        let now = Instant::now();
        conn.connect(&proxy("10.0.0.1"), now).unwrap();
        assert!(conn.poll(now));

        conn.disconnect();
        assert_eq!(conn.status().to_string(), "Disconnected");
        assert!(conn.platform().active().is_none());
    }

    #[test]
    fn test_reconnect_switches_proxy() {
        let mut conn = Connection::new(SimulatedTunnel::new(), Duration::ZERO);
        let now = Instant::now();
        conn.connect(&proxy("10.0.0.1"), now).unwrap();
        conn.connect(&proxy("10.0.0.2"), now).unwrap();

        assert_eq!(conn.platform().active().unwrap().address, "10.0.0.2");
        assert_eq!(conn.status().proxy().unwrap().address, "10.0.0.2");
    }

    #[test]
    fn test_simulated_platform_rejects_double_start() {
        let mut platform = SimulatedTunnel::new();
        platform.start_tunnel(&proxy("10.0.0.1")).unwrap();
        assert_eq!(
            platform.start_tunnel(&proxy("10.0.0.2")),
            Err(TunnelError::AlreadyActive("10.0.0.1".to_string()))
        );
    }
}
