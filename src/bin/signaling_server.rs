//! Standalone rendezvous binary: runs the signaling protocol that peers use
//! to discover their `VAddr` and initial context membership (§4.1, §4.3).

use std::net::SocketAddr;
use std::sync::Arc;

use cagenet::signaling::{server, Registry};
use clap::Parser;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the signaling server on.
    #[clap(short, long, default_value = "0.0.0.0:9000")]
    listen: SocketAddr,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "cagenet=debug".
    #[clap(short, long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    cagenet::logging::init(&args.log_filter);

    let registry = Arc::new(Registry::new());
    server::run(args.listen, registry).await
}
