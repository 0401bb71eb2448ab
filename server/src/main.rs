use clap::Parser;
use log::info;
use server::config::RoomConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Room tick rate (updates per second)
    #[arg(short, long, env = "SERVER_FPS", default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected clients across all rooms
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Delay between a start request and the first block
    #[arg(long, default_value = "1000")]
    start_delay_ms: u64,

    /// Seed for reproducible block sequences
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = RoomConfig {
        tick_rate: args.tick_rate,
        start_delay: Duration::from_millis(args.start_delay_ms),
        seed: args.seed,
        ..RoomConfig::default()
    };

    info!("Starting server...");
    info!("Tick rate: {}Hz", config.tick_rate);
    info!("Max clients: {}", args.max_clients);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, args.max_clients).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
