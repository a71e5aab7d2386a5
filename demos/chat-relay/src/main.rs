//! Minimal chatwire relay.
//!
//! Accepts channels at any path, authenticates each one by its `token` query
//! parameter (its decoded value is the user id), answers heartbeats, and forwards
//! envelopes to every connection of the recipient. Nothing is stored.
//!
//!   cargo run -p chatwire-demo-relay -- --port 8080

mod protocol;
mod server;

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Relay chatwire envelopes between connected users")]
struct Args {
    #[arg(long, env = "CHATWIRE_RELAY_HOST", default_value = "127.0.0.1")]
    host: IpAddr,
    #[arg(long, env = "CHATWIRE_RELAY_PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chatwire_demo_relay=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.host, args.port);

    tracing::info!("Starting relay on {}", addr);
    server::run(addr).await
}
