//! Prerender - renders JavaScript-heavy pages through headless Chrome.
//!
//! Main entry point for the prerender gateway.

mod breaker;
mod cli;
mod filters;
mod handlers;
mod server;
mod state;

use clap::Parser;
use tracing::info;

use cli::Cli;
use prerender_config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    server::init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(chrome_host) = cli.chrome_host {
        config.chrome_host = chrome_host;
    }
    if let Some(chrome_port) = cli.chrome_port {
        config.chrome_port = chrome_port;
    }

    info!(
        "Configuration loaded: listen={}:{} chrome={}",
        config.host,
        config.port,
        config.chrome_endpoint()
    );

    server::run_server(config).await
}
