//! Command line interface.
//!
//! Everything is configurable through the environment; the flags here
//! only override the most commonly tweaked values.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "prerender", version, about = "Prerendering gateway over headless Chrome")]
pub struct Cli {
    /// Listen address (overrides HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Browser debugger host (overrides CHROME_HOST).
    #[arg(long)]
    pub chrome_host: Option<String>,

    /// Browser debugger port (overrides CHROME_PORT).
    #[arg(long)]
    pub chrome_port: Option<u16>,
}
