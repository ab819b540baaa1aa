use clap::Parser;
use mirage_proxy::config::Config;
use mirage_proxy::server::{MetricsServer, MirageServer};
use mirage_proxy::Engine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mirage-proxy")]
#[command(author, version, about = "HTTP service virtualization engine")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "MIRAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the initial mode
    #[arg(short, long)]
    mode: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Simulation file to import at start
    #[arg(short, long)]
    simulation: Option<PathBuf>,

    /// Run as a standalone server instead of a proxy
    #[arg(long)]
    webserver: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if args.simulation.is_some() {
        config.simulation = args.simulation;
    }
    config.webserver |= args.webserver;
    config.validate()?;

    let engine = Arc::new(Engine::from_config(&config)?);
    let addr: SocketAddr = config.listen.address().parse()?;

    if config.metrics.enabled {
        let metrics_addr = SocketAddr::new(addr.ip(), config.metrics.port);
        tokio::spawn(async move {
            if let Err(e) = MetricsServer::new(metrics_addr).run().await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let server = MirageServer::new(addr, engine);
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
