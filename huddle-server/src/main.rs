//! Huddle chat server.
//!
//! Accepts WebSocket clients and places each one in the oldest room that
//! still has a free slot. Configuration comes from flags or `HUDDLE_*`
//! environment variables; log output is controlled by `RUST_LOG`.

use clap::Parser;
use huddle_collab::{ChatServer, ServerConfig};
use huddle_core::DEFAULT_MAX_USERS;
use log::info;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "huddle-server", version, about = "Capacity-bounded chat room server")]
struct Args {
    /// Address to listen on.
    #[arg(long = "bind", env = "HUDDLE_BIND_ADDR", default_value = "127.0.0.1:9090")]
    bind_addr: String,

    /// Maximum members per room.
    #[arg(long, env = "HUDDLE_MAX_USERS", default_value_t = DEFAULT_MAX_USERS)]
    max_users: usize,

    /// Events buffered per connection before deliveries to it fail.
    #[arg(long, env = "HUDDLE_OUTBOUND_CAPACITY", default_value_t = 256)]
    outbound_capacity: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind_addr,
            max_users: args.max_users,
            outbound_capacity: args.outbound_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    info!("Starting huddle server with {args:?}");

    let server = ChatServer::new(args.into())?;
    server.run().await?;
    Ok(())
}
