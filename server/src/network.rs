//! Server network layer handling UDP communications and room routing

use crate::client_manager::ClientManager;
use crate::config::RoomConfig;
use crate::error::ServerError;
use crate::room_runner::{spawn_room, RoomEvent, RoomHandle};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, SessionId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network and room tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: SessionId,
        room: String,
    },
    RoomClosed {
        room: String,
        generation: u64,
        /// Set when the room stopped because of a fatal error.
        reason: Option<String>,
    },
    Shutdown,
}

/// Messages sent to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    SendToSession { session: SessionId, packet: Packet },
    BroadcastPacket {
        room: String,
        /// Session left out of the broadcast, if any.
        except: Option<SessionId>,
        packet: Packet,
    },
}

/// Main server routing datagrams between clients and rooms
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    config: RoomConfig,
    rooms: HashMap<String, RoomHandle>,
    next_generation: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: RoomConfig,
        max_clients: usize,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            config,
            rooms: HashMap::new(),
            next_generation: 1,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToSession { session, packet } => {
                        let addr = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client(session).map(|c| c.addr)
                        };
                        let Some(addr) = addr else {
                            debug!("Dropping packet for departed session {}", session);
                            continue;
                        };
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send to session {}: {}", session, e);
                        }
                    }
                    GameMessage::BroadcastPacket {
                        room,
                        except,
                        packet,
                    } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_room_addrs(&room)
                        };

                        for (client_id, addr) in client_addrs {
                            if except == Some(client_id) {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout {
                        client_id: client.id,
                        room: client.room,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(ServerError::PacketTooLarge {
                size: data.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn spawn_room(&mut self, name: &str) -> RoomHandle {
        let generation = self.next_generation;
        self.next_generation += 1;
        let handle = spawn_room(
            name.to_string(),
            generation,
            self.config.clone(),
            self.game_tx.clone(),
            self.server_tx.clone(),
        );
        self.rooms.insert(name.to_string(), handle.clone());
        handle
    }

    /// Delivers an event to a room. Joins create the room if it does not
    /// exist or its task has already exited.
    fn route_to_room(&mut self, name: &str, event: RoomEvent) {
        let event = match self.rooms.get(name) {
            Some(handle) => match handle.send(event) {
                Ok(()) => return,
                Err(event) => {
                    warn!("Room {} has stopped", name);
                    self.rooms.remove(name);
                    event
                }
            },
            None => event,
        };

        if !matches!(event, RoomEvent::Join { .. }) {
            warn!("Dropping {:?} for missing room {}", event, name);
            return;
        }

        let handle = self.spawn_room(name);
        if handle.send(event).is_err() {
            error!("Freshly spawned room {} rejected its first event", name);
        }
    }

    /// Removes a session and tells its room. The registry forgets the room
    /// as soon as its last member is gone, so a later join gets a new one.
    async fn remove_session(&mut self, client_id: SessionId) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(client_id)
        };
        if let Some(client) = removed {
            self.notify_room_of_leave(client_id, &client.room).await;
        }
    }

    async fn notify_room_of_leave(&mut self, client_id: SessionId, room: &str) {
        if let Some(handle) = self.rooms.get(room) {
            if handle.send(RoomEvent::Leave { session: client_id }).is_err() {
                debug!("Room {} already gone", room);
            }
        }
        let has_members = {
            let clients = self.clients.read().await;
            clients.room_has_members(room)
        };
        if !has_members {
            self.rooms.remove(room);
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = {
            let mut clients = self.clients.write().await;
            clients.touch(addr);
            clients.find_client_by_addr(addr)
        };

        match packet {
            Packet::Join {
                client_version,
                room,
                profile,
            } => {
                info!(
                    "Client joining room {} from {} (version: {})",
                    room, addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Rejected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.remove_session(existing_id).await;
                }

                let session = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr, &room)
                };

                match session {
                    Some(session_id) => {
                        self.send_packet(Packet::Joined { session_id }, addr);
                        self.route_to_room(
                            &room,
                            RoomEvent::Join {
                                session: session_id,
                                profile,
                            },
                        );
                    }
                    None => {
                        self.send_packet(
                            Packet::Rejected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Client(message) => {
                let Some(session) = client_id else {
                    warn!("{} from unknown address {}", message.name(), addr);
                    return;
                };
                let room = {
                    let clients = self.clients.read().await;
                    clients.get_client(session).map(|c| c.room.clone())
                };
                if let Some(room) = room {
                    self.route_to_room(&room, RoomEvent::Message { session, message });
                }
            }

            Packet::Heartbeat => {}

            Packet::Leave => {
                if let Some(client_id) = client_id {
                    self.remove_session(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Handles a room task ending
    async fn handle_room_closed(&mut self, room: String, generation: u64, reason: Option<String>) {
        let current = self
            .rooms
            .get(&room)
            .map_or(false, |h| h.generation == generation);
        if current {
            self.rooms.remove(&room);
        }

        let Some(reason) = reason else {
            info!("Room {} (generation {}) closed", room, generation);
            return;
        };

        error!("Room {} closed after failure: {}", room, reason);
        if !current {
            return;
        }

        // members of the failed room are disconnected; other rooms carry on
        let members = {
            let mut clients = self.clients.write().await;
            let members = clients.get_room_addrs(&room);
            for (client_id, _) in &members {
                clients.remove_client(*client_id);
            }
            members
        };
        for (_, addr) in members {
            self.send_packet(
                Packet::Disconnected {
                    reason: reason.clone(),
                },
                addr,
            );
        }
    }

    /// Main server loop dispatching network and room events
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientTimeout { client_id, room } => {
                    info!("Client {} timed out", client_id);
                    self.notify_room_of_leave(client_id, &room).await;
                }
                ServerMessage::RoomClosed {
                    room,
                    generation,
                    reason,
                } => {
                    self.handle_room_closed(room, generation, reason).await;
                }
                ServerMessage::Shutdown => break,
            }
        }

        info!("Server shutting down");
        self.dispose_rooms();
        Ok(())
    }

    /// Tells every registered room to dispose. Returns how many were still
    /// running to receive it.
    fn dispose_rooms(&self) -> usize {
        let mut disposed = 0;
        for (name, handle) in &self.rooms {
            match handle.send(RoomEvent::Dispose) {
                Ok(()) => disposed += 1,
                Err(e) => debug!("Room {} already stopped: {:?}", name, e),
            }
        }
        disposed
    }
}
