//! Proxy checker module for one-shot connectivity checks

use crate::error::ProbeError;
use crate::proxy::models::{ProxyKind, ProxyRecord};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://example.com";

/// Outcome of a single check
pub type ProbeResult = std::result::Result<ProbeSuccess, ProbeError>;

/// How a record is turned into a client proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeRoute {
    /// Every record is used as a plain HTTP proxy, whatever its kind.
    /// SOCKS records are therefore not really exercised.
    #[default]
    HttpOnly,
    /// SOCKS5 records go through a SOCKS5 connector; SOCKS4 is refused.
    ByKind,
}

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    pub timeout: Duration,
    /// URL to test proxies against
    pub test_url: String,
    /// Routing of SOCKS records
    pub route: ProbeRoute,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            test_url: DEFAULT_TEST_URL.to_string(),
            route: ProbeRoute::default(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_route(mut self, route: ProbeRoute) -> Self {
        self.route = route;
        self
    }
}

/// A completed request through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSuccess {
    /// Status returned by the target; not judged
    pub status: u16,
    pub response_time_ms: u64,
}

/// Proxy checker allowing one request in flight at a time
///
/// Clones share the in-flight flag.
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the check ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        Self {
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a check is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Check a single proxy
    pub async fn check(&self, record: &ProxyRecord) -> ProbeResult {
        let _guard = self.begin()?;
        let start = Instant::now();

        let client = self.create_client(record)?;
        debug!(proxy = %record, url = %self.config.test_url, "Checking proxy");

        let result = match tokio::time::timeout(
            self.config.timeout,
            client.get(&self.config.test_url).send(),
        )
        .await
        {
            Ok(Ok(response)) => Ok(ProbeSuccess {
                status: response.status().as_u16(),
                response_time_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout),
            Ok(Err(e)) if e.is_builder() => Err(ProbeError::Client(e.to_string())),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        };

        if let Err(ref e) = result {
            warn!(proxy = %record, error = %e, "Proxy check failed");
        }
        result
    }

    /// Run a check on the runtime and deliver its outcome on a channel
    pub fn spawn_check(&self, record: ProxyRecord) -> oneshot::Receiver<ProbeResult> {
        let (tx, rx) = oneshot::channel();
        let checker = self.clone();
        tokio::spawn(async move {
            let result = checker.check(&record).await;
            // Receiver may have been dropped by a closed UI.
            let _ = tx.send(result);
        });
        rx
    }

    fn begin(&self) -> Result<InFlight, ProbeError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(Arc::clone(&self.in_flight)))
            .map_err(|_| ProbeError::Busy)
    }

    /// Create a reqwest client with the proxy
    fn create_client(&self, record: &ProxyRecord) -> Result<Client, ProbeError> {
        let reqwest_proxy = match (self.config.route, record.kind) {
            (ProbeRoute::ByKind, ProxyKind::Socks5) => {
                ReqwestProxy::all(format!("socks5h://{}", record.endpoint()))
            }
            (ProbeRoute::ByKind, ProxyKind::Socks4) => {
                return Err(ProbeError::UnsupportedKind(record.kind.to_string()));
            }
            (ProbeRoute::HttpOnly, kind) if kind.is_socks() => {
                warn!(proxy = %record, "Routing SOCKS proxy as HTTP proxy");
                ReqwestProxy::all(format!("http://{}", record.endpoint()))
            }
            _ => ReqwestProxy::all(format!("http://{}", record.endpoint())),
        }
        .map_err(|e| ProbeError::Client(e.to_string()))?;

        Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}
