use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use proxy_manager::{
    logging,
    proxy::{CheckerConfig, ProbeRoute, ProxyChecker, Registry},
    tui::ProxyManagerApp,
    tunnel::{Connection, SimulatedTunnel},
    Config, RegistryError, DEFAULT_STORAGE_PATH,
};
use std::path::PathBuf;
use std::time::Duration;

/// A proxy list manager with connectivity checks
#[derive(Parser)]
#[command(name = "proxy-manager")]
#[command(about = "A proxy list manager with connectivity checks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Proxy list file path
    #[arg(short, long, default_value = DEFAULT_STORAGE_PATH)]
    storage: PathBuf,

    /// Log filter, e.g. "debug" (defaults to RUST_LOG, then "info")
    #[arg(long)]
    log_level: Option<String>,

    /// Log file used while the TUI is running
    #[arg(long, default_value = "proxy-manager.log")]
    log_file: PathBuf,

    /// Check timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    timeout: u64,

    /// URL to request through the proxy when checking
    #[arg(long, global = true, default_value = "http://example.com")]
    test_url: String,

    /// Route SOCKS5 proxies through a SOCKS connector when checking
    #[arg(long, global = true)]
    route_by_kind: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let route = if self.route_by_kind {
            ProbeRoute::ByKind
        } else {
            ProbeRoute::HttpOnly
        };
        let checker = CheckerConfig::new()
            .with_timeout(Duration::from_secs(self.timeout))
            .with_test_url(self.test_url.clone())
            .with_route(route);

        Config::default()
            .with_storage_path(&self.storage)
            .with_checker(checker)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive TUI
    Tui,
    /// List all proxies
    List,
    /// Add a new proxy
    Add {
        /// Proxy host or IP address
        address: String,
        /// Proxy port
        port: String,
        /// Proxy type (http, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
    /// Delete a proxy by index
    Delete {
        /// Index as shown by `list`
        index: usize,
    },
    /// Check a proxy by index
    Check {
        /// Index as shown by `list`
        index: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config();

    match &cli.command {
        Some(Commands::Tui) | None => logging::init_file(&cli.log_file, cli.log_level.as_deref())?,
        Some(_) => logging::init_console(cli.log_level.as_deref()),
    }

    let mut registry = Registry::load(&config.storage_path)
        .with_context(|| format!("cannot load proxy list {}", config.storage_path.display()))?;

    match cli.command {
        Some(Commands::Tui) | None => {
            // Default to TUI mode
            let checker = ProxyChecker::with_config(config.checker.clone());
            let connection = Connection::new(SimulatedTunnel::new(), config.tunnel_settle);
            let mut app = ProxyManagerApp::new(registry, checker, connection);
            app.run().await?;
        }
        Some(Commands::List) => {
            if registry.is_empty() {
                println!("No proxies configured in {}.", registry.path().display());
            } else {
                for (i, proxy) in registry.list().iter().enumerate() {
                    println!("{}. {}", i, proxy.display_line());
                }
            }
        }
        Some(Commands::Add {
            address,
            port,
            proxy_type,
        }) => {
            report(registry.add(&address, &port, &proxy_type))?;
            if let Some(proxy) = registry.list().last() {
                println!("Proxy added: {}", proxy.display_line());
            }
        }
        Some(Commands::Delete { index }) => {
            let removed = registry.get(index).cloned();
            report(registry.delete(Some(index)))?;
            if let Some(proxy) = removed {
                println!("Proxy deleted: {}", proxy.display_line());
            }
        }
        Some(Commands::Check { index }) => {
            let proxy = registry
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow!("No proxy at index {}", index))?;

            let checker = ProxyChecker::with_config(config.checker.clone());

            println!("Testing {} via {}...", config.checker.test_url, proxy.url());
            match checker.check(&proxy).await {
                Ok(success) => println!(
                    "Proxy connection successful! (HTTP {}, {}ms)",
                    success.status, success.response_time_ms
                ),
                Err(e) => return Err(anyhow!("Proxy connection failed: {}", e)),
            }
        }
    }

    Ok(())
}

/// Validation errors abort; a failed save is only reported
fn report<T>(result: std::result::Result<T, RegistryError>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_validation() => Err(anyhow!(e)),
        Err(e) => {
            eprintln!("Warning: {}", e);
            Ok(())
        }
    }
}
