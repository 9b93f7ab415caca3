mod config;
mod status_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use locshare_gateway::{start_server, GatewayConfig, GatewayState};
use tracing::info;

use config::Config;

#[derive(Parser)]
#[command(name = "locshare")]
#[command(about = "locshare — ephemeral live location sharing relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind the HTTP server to
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Show the status of a running relay
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init_logger(&config.log_level, config.log_dir.as_deref());

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                bind_address: bind.unwrap_or(config.bind_address),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => status_cmd::run(config.port).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;
    info!(
        addr = %addr,
        idle_timeout_secs = config.idle_timeout_secs,
        sweep_interval_secs = config.sweep_interval_secs,
        "Starting locshare relay"
    );

    let gateway = GatewayConfig {
        idle_timeout: config.idle_timeout(),
        sweep_interval: config.sweep_interval(),
        static_dir: config.static_dir.clone(),
        ..GatewayConfig::new(addr)
    };
    start_server(gateway, GatewayState::new()).await
}
