use clap::Parser;
use tracing_subscriber::EnvFilter;
use wust_hub::{DEFAULT_MAX_PAYLOAD, ServerConfig, WebSocketServer, hub};

#[derive(Parser)]
#[command(author, version, about = "WebSocket broadcast server")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8888)]
    port: u16,

    /// Pending hub events before readers wait
    #[arg(long, default_value_t = hub::DEFAULT_CAPACITY)]
    hub_capacity: usize,

    /// Largest accepted frame payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            addr: args.addr,
            port: args.port,
            hub_capacity: args.hub_capacity,
            max_payload: Some(args.max_payload),
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("wust_hub=info".parse().unwrap()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    WebSocketServer::bind(args.into()).await?.run().await
}
