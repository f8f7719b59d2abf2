// aesdsocket: line-retention TCP service (port 9000 by default)
use aesd_core::ResponseMode;
use aesd_daemon::{system, Server, ServerConfig};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aesdsocket")]
#[command(about = "Retains the last N newline-delimited records and serves them over TCP", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Run in the background after the listener is set up
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Listen address
    #[arg(short, long)]
    bind: Option<String>,

    /// TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of records retained
    #[arg(long)]
    capacity: Option<usize>,

    /// Response policy: echo or positioned
    #[arg(short, long)]
    mode: Option<ResponseMode>,

    /// Timestamp record period in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    heartbeat_secs: Option<u64>,

    /// Ephemeral backing file, deleted on exit
    #[arg(long, value_name = "PATH")]
    data_file: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(ref bind) = self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat_secs(secs);
        }
        if let Some(ref path) = self.data_file {
            config.data_file = Some(path.clone());
        }
        config.with_deployment_defaults()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.apply(ServerConfig::from_env());

    let signals = system::block_termination_signals().context("failed to block signals")?;

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e).context("setup failed");
        }
    };

    if cli.daemon {
        system::daemonize().context("failed to daemonize")?;
    }

    system::spawn_signal_watcher(signals, server.shutdown_handle()).context("failed to start signal watcher")?;

    server.run().context("service failed")?;
    Ok(())
}
