use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use aria_gateway::logging::{CaptureLayer, LogBuffer, DEFAULT_CAPACITY};
use aria_gateway::{Config, Daemon};

/// Aria - on-device voice AI gateway
#[derive(Parser)]
#[command(name = "aria", version, about)]
struct Cli {
    /// Wyoming TCP port
    #[arg(long, env = "ARIA_WYOMING_PORT")]
    wyoming_port: Option<u16>,

    /// HTTP API port
    #[arg(long, env = "ARIA_HTTP_PORT")]
    http_port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "ARIA_CONFIG")]
    config: Option<PathBuf>,

    /// Disable mDNS advertisement
    #[arg(long, env = "ARIA_DISABLE_MDNS")]
    disable_mdns: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity, mirrored into the log buffer
    // that backs /api/logs.
    let filter = match cli.verbose {
        0 => "info,aria_gateway=info",
        1 => "info,aria_gateway=debug",
        2 => "debug",
        _ => "trace",
    };
    let logs = LogBuffer::new(DEFAULT_CAPACITY);
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .with(CaptureLayer::new(Arc::clone(&logs)))
        .init();

    match run(cli, logs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, logs: Arc<LogBuffer>) -> aria_gateway::Result<()> {
    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(port) = cli.wyoming_port {
        config.wyoming_port = port;
    }
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }
    if cli.disable_mdns {
        config.mdns_enabled = false;
    }

    tracing::info!(
        wyoming_port = config.wyoming_port,
        http_port = config.http_port,
        mdns = config.mdns_enabled,
        "starting aria gateway"
    );

    Daemon::new(config, logs).run().await
}
