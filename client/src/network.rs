use crate::mirror::ClientGameState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{ClientMessage, Packet, PlayerProfile, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Commands the bot picks from when sending random input.
pub const BOT_COMMANDS: [&str; 6] = [
    "move-left",
    "move-right",
    "stop-move-left",
    "stop-move-right",
    "rotate-left",
    "rotate-right",
];

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub room: String,
    pub profile: PlayerProfile,
    /// Ready up and ask for a start as soon as the join is accepted.
    pub start: bool,
    /// Send a random command this often once the game has started.
    pub input_interval: Option<Duration>,
    pub seed: Option<u64>,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session_id: Option<u32>,
    connected: bool,
    options: ClientOptions,
    rng: StdRng,

    game_state: ClientGameState,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Client {
            socket,
            server_addr,
            session_id: None,
            connected: false,
            options,
            rng,
            game_state: ClientGameState::new(),
        })
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    async fn join(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Joining room {}...", self.options.room);

        let packet = Packet::Join {
            client_version: PROTOCOL_VERSION,
            room: self.options.room.clone(),
            profile: self.options.profile.clone(),
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_message(&self, message: ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }
        self.send_packet(&Packet::Client(message)).await
    }

    /// Returns false once the server has turned this client away.
    async fn handle_packet(&mut self, packet: Packet) -> Result<bool, Box<dyn std::error::Error>> {
        match packet {
            Packet::Joined { session_id } => {
                info!("Joined! Session ID: {}", session_id);
                self.session_id = Some(session_id);
                self.connected = true;

                if self.options.start {
                    self.send_message(ClientMessage::ReadyUp(true)).await?;
                    self.send_message(ClientMessage::StartGameRequested).await?;
                }
            }

            Packet::Room(message) => {
                debug!("Room message: {}", message.name());
                self.game_state.apply(message);
            }

            Packet::Rejected { reason } => {
                warn!("Join rejected: {}", reason);
                return Ok(false);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.session_id = None;
                return Ok(false);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
        Ok(true)
    }

    async fn send_random_input(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.game_state.game_started {
            return Ok(());
        }
        if let Some(command) = BOT_COMMANDS.choose(&mut self.rng) {
            debug!("Sending {}", command);
            self.send_message(ClientMessage::PlayerInput(command.to_string()))
                .await?;
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.join().await?;

        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        heartbeat_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_interval = self.options.input_interval.map(interval);

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                if !self.handle_packet(packet).await? {
                                    break;
                                }
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                _ = async {
                    match input_interval.as_mut() {
                        Some(ticker) => ticker.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Err(e) = self.send_random_input().await {
                        error!("Error sending input: {}", e);
                    }
                },
            }
        }

        Ok(())
    }

    /// Tells the server this client is leaving.
    pub async fn leave(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connected {
            self.send_packet(&Packet::Leave).await?;
            self.connected = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            room: "lobby".to_string(),
            profile: PlayerProfile {
                user_id: "bot".to_string(),
                display_name: "Bot".to_string(),
                avatar_ref: String::new(),
            },
            start: false,
            input_interval: None,
            seed: Some(1),
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_server_address() {
        assert!(Client::new("not an address", options()).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_joined_and_disconnected() {
        let mut client = Client::new("127.0.0.1:9", options()).await.unwrap();

        assert!(client
            .handle_packet(Packet::Joined { session_id: 3 })
            .await
            .unwrap());
        assert_eq!(client.session_id(), Some(3));

        let keep_going = client
            .handle_packet(Packet::Disconnected {
                reason: "room failed".to_string(),
            })
            .await
            .unwrap();
        assert!(!keep_going);
        assert_eq!(client.session_id(), None);
    }

    #[tokio::test]
    async fn test_room_messages_reach_mirror() {
        let mut client = Client::new("127.0.0.1:9", options()).await.unwrap();
        client
            .handle_packet(Packet::Room(shared::RoomMessage::GameStarted))
            .await
            .unwrap();
        assert!(client.game_state().game_started);
    }

    #[test]
    fn test_bot_commands_are_distinct() {
        let mut names = BOT_COMMANDS.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BOT_COMMANDS.len());
    }
}
