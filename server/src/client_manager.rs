//! Client session management for the room server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Session allocation and capacity enforcement
//! - Address to session lookup for inbound datagrams
//! - Room membership, used to route broadcasts
//! - Connection health monitoring and timeout cleanup

use log::info;
use shared::SessionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Clients silent for longer than this are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client
///
/// Each client maintains:
/// - Its session id and network address
/// - The room it joined
/// - The last time any packet arrived from it
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique session identifier assigned by the server
    pub id: SessionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Name of the room this client joined
    pub room: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client in the given room, marked as recently active
    pub fn new(id: SessionId, addr: SocketAddr, room: impl Into<String>) -> Self {
        Self {
            id,
            addr,
            room: room.into(),
            last_seen: Instant::now(),
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients across every room
///
/// The ClientManager provides centralized control over client connections,
/// enforces server capacity limits and answers the lookups the network
/// layer needs to route packets in and out of rooms.
pub struct ClientManager {
    /// Connected clients indexed by session id
    clients: HashMap<SessionId, Client>,
    /// Next available session id for new connections
    next_client_id: SessionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Session ids start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection to a room
    ///
    /// Returns Some(session_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, room: &str) -> Option<SessionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {} to room {}", client_id, addr, room);
        self.clients
            .insert(client_id, Client::new(client_id, addr, room));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client, or None if it was already gone. This
    /// handles both explicit leaves and timeout cleanup.
    pub fn remove_client(&mut self, client_id: SessionId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} disconnected from room {}", client.id, client.room);
        Some(client)
    }

    /// Finds a session id by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    pub fn get_client(&self, client_id: SessionId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Refreshes the activity timestamp of the client at `addr`
    ///
    /// Returns false if no client is connected from that address.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        match self.clients.values_mut().find(|client| client.addr == addr) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed clients so their rooms can be told.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<SessionId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|client| client.id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Gets the session ids and addresses of every client in a room
    pub fn get_room_addrs(&self, room: &str) -> Vec<(SessionId, SocketAddr)> {
        let mut addrs: Vec<(SessionId, SocketAddr)> = self
            .clients
            .values()
            .filter(|client| client.room == room)
            .map(|client| (client.id, client.addr))
            .collect();
        addrs.sort_by_key(|(id, _)| *id);
        addrs
    }

    /// Returns true if at least one client is in the room
    pub fn room_has_members(&self, room: &str) -> bool {
        self.clients.values().any(|client| client.room == room)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
