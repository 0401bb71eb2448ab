use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use shared::PlayerProfile;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = "lobby")]
    room: String,

    /// Stable user id reported to the room
    #[arg(short = 'u', long, default_value = "bot")]
    user_id: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "Bot")]
    name: String,

    /// Avatar reference
    #[arg(long, default_value = "")]
    avatar: String,

    /// Ready up and request a game start after joining
    #[arg(long)]
    start: bool,

    /// Send a random command every N milliseconds (0 disables input)
    #[arg(short = 'i', long, default_value = "0")]
    input_interval_ms: u64,

    /// Seed for the bot's command choices
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

    info!("Starting client...");
    info!("Connecting to: {} (room {})", args.server, args.room);

    let options = ClientOptions {
        room: args.room,
        profile: PlayerProfile {
            user_id: args.user_id,
            display_name: args.name,
            avatar_ref: args.avatar,
        },
        start: args.start,
        input_interval: (args.input_interval_ms > 0)
            .then(|| Duration::from_millis(args.input_interval_ms)),
        seed: args.seed,
    };

    let mut client = Client::new(&args.server, options).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving room");
        }
    }
    client.leave().await?;

    Ok(())
}
