//! Runs each room on its own tokio task.
//!
//! The task owns the [`Room`] outright, so nothing inside a room is ever
//! touched concurrently. It waits on three things: inbound events, the
//! deferred game start, and the tick interval once the game is running.

use crate::config::RoomConfig;
use crate::network::{GameMessage, ServerMessage};
use crate::physics::{PhysicsEngine, SimpleEngine};
use crate::room::{Outbound, Room};
use log::{debug, error, info};
use shared::{ClientMessage, Packet, PlayerProfile, SessionId};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};

#[derive(Debug)]
pub enum RoomEvent {
    Join {
        session: SessionId,
        profile: PlayerProfile,
    },
    Leave {
        session: SessionId,
    },
    Message {
        session: SessionId,
        message: ClientMessage,
    },
    Dispose,
}

/// Sending side of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub name: String,
    /// Distinguishes successive rooms spawned under the same name.
    pub generation: u64,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomHandle {
    /// Hands the event back if the room task has already exited.
    pub fn send(&self, event: RoomEvent) -> Result<(), RoomEvent> {
        self.tx.send(event).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns a room backed by the built-in physics engine.
pub fn spawn_room(
    name: String,
    generation: u64,
    config: RoomConfig,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let room = Room::new(name.clone(), config, SimpleEngine::new());
    tokio::spawn(run_room(room, generation, rx, game_tx, server_tx));
    RoomHandle {
        name,
        generation,
        tx,
    }
}

/// Waits for the next tick. The interval's own instant is the scheduled
/// deadline, so callers read the clock themselves.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drives a room until it empties, is told to dispose, or fails.
pub async fn run_room<E: PhysicsEngine + 'static>(
    mut room: Room<E>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<RoomEvent>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let name = room.name().to_string();
    let mut ticker: Option<Interval> = None;

    let failure = loop {
        let start_at = room.start_deadline().map(Instant::from_std);

        tokio::select! {
            event = rx.recv() => match event {
                Some(RoomEvent::Join { session, profile }) => {
                    room.join(session, profile);
                }
                Some(RoomEvent::Leave { session }) => {
                    room.leave(session);
                    if room.is_empty() {
                        info!("Room {} is empty", name);
                        break None;
                    }
                }
                Some(RoomEvent::Message { session, message }) => {
                    if let Err(e) = room.handle_message(session, message, Instant::now().into_std()) {
                        break Some(e);
                    }
                }
                Some(RoomEvent::Dispose) | None => break None,
            },

            _ = sleep_until(start_at.unwrap_or_else(Instant::now)), if start_at.is_some() => {
                if let Err(e) = room.start_game(Instant::now().into_std()) {
                    break Some(e);
                }
                let mut tick_interval = interval(room.config().tick_duration());
                tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker = Some(tick_interval);
            },

            _ = next_tick(&mut ticker), if ticker.is_some() => {
                if let Err(e) = room.tick(std::time::Instant::now()) {
                    break Some(e);
                }
            },
        }

        flush(&mut room, &game_tx);
    };

    if let Some(e) = &failure {
        error!("Room {} failed: {}", name, e);
    }
    room.dispose();
    flush(&mut room, &game_tx);

    let reason = failure.map(|e| e.to_string());
    if let Err(e) = server_tx.send(ServerMessage::RoomClosed {
        room: name,
        generation,
        reason,
    }) {
        debug!("Server gone before room close was reported: {}", e);
    }
}

fn flush<E: PhysicsEngine + 'static>(
    room: &mut Room<E>,
    game_tx: &mpsc::UnboundedSender<GameMessage>,
) {
    for outbound in room.drain_outbox() {
        let message = match outbound {
            Outbound::Broadcast(message) => GameMessage::BroadcastPacket {
                room: room.name().to_string(),
                except: None,
                packet: Packet::Room(message),
            },
            Outbound::BroadcastExcept { except, message } => GameMessage::BroadcastPacket {
                room: room.name().to_string(),
                except: Some(except),
                packet: Packet::Room(message),
            },
            Outbound::Send { session, message } => GameMessage::SendToSession {
                session,
                packet: Packet::Room(message),
            },
        };
        if let Err(e) = game_tx.send(message) {
            error!("Failed to queue room packet: {}", e);
            return;
        }
    }
}
