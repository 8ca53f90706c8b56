use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroscan_core::{LogFormat, LoggingConfig, ScanConfig};
use zeroscan_discovery::{Host, Resolver};

/// zeroscan - Discover mDNS/DNS-SD services and group them by host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service descriptors to browse, e.g. `_http._tcp.local.`
    protocols: Vec<String>,

    /// Path to configuration file
    #[arg(short, long, env = "ZEROSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Scan window in milliseconds
    #[arg(short, long)]
    scan_time_ms: Option<u64>,

    /// Per-instance resolve timeout in milliseconds
    #[arg(long)]
    resolve_timeout_ms: Option<u64>,

    /// Repeat empty scans up to the configured retry count
    #[arg(long)]
    retry_empty: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print hosts as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_hosts(hosts: &[Host]) {
    for host in hosts {
        println!("{} [{}]", host.display_name, host.id);
        for address in &host.ip_addresses {
            println!("  address {}", address);
        }
        for service in &host.services {
            println!(
                "  {} port {} ({} on {})",
                service.name, service.port, service.instance, service.hostname
            );
            let mut properties: Vec<_> = service.properties.iter().collect();
            properties.sort();
            for (key, value) in properties {
                println!("    {}={}", key, value);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration file, if any
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_config_builder(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => ScanConfig::default(),
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging);

    // Command line overrides
    let mut options = config.scan;
    if !args.protocols.is_empty() {
        options.protocols = args.protocols;
    }
    if let Some(ms) = args.scan_time_ms {
        options = options.with_scan_time(Duration::from_millis(ms));
    }
    if let Some(ms) = args.resolve_timeout_ms {
        options = options.with_resolve_timeout(Duration::from_millis(ms));
    }
    if args.retry_empty {
        options = options.with_retry_empty_scans(true);
    }

    let resolver = Resolver::mdns().context("Failed to start mDNS backend")?;

    // Ctrl-C ends the scan early; whatever resolved so far is still printed
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, finishing scan early");
            trigger.cancel();
        }
    });

    info!(protocols = ?options.protocols, scan_time_ms = options.scan_time_ms, "Starting scan");

    let hosts = resolver
        .resolve(&options, None, &cancel)
        .await
        .context("Scan failed")?;

    if hosts.is_empty() {
        warn!("No hosts found");
    }

    if args.json {
        let json = serde_json::to_string_pretty(&hosts).context("Failed to encode hosts")?;
        println!("{}", json);
    } else {
        print_hosts(&hosts);
    }

    Ok(())
}
