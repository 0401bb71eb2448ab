//! # Block Room Server Library
//!
//! This library provides the authoritative server for a multiplayer falling
//! block game. Players gather in named rooms, ready up, and each controls a
//! tetromino dropping into their own lane. The server owns the physics,
//! turns player commands into body motion and broadcasts what changed.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every room runs its own physics world. Clients never move bodies
//! themselves; they send named commands (`move-left`, `rotate-right`, ...)
//! and mirror the deltas the room broadcasts back.
//!
//! ### Room Lifecycle
//! Rooms are created by the first join under a name and go through
//! Lobby, Starting, Playing and Disposed. The last player leaving disposes
//! the room and frees every body, hook and bookkeeping entry it held.
//!
//! ### State Broadcasting
//! After each step the room compares body poses to the last values it
//! sent and emits only the axes that moved, batched into small datagrams.
//! Roster changes go out the same way as explicit patches.
//!
//! ## Architecture Design
//!
//! ### One Task Per Room
//! Each room is owned by a single tokio task. Events, the deferred start and
//! the tick interval are multiplexed with `select!`, so room state is never
//! shared and needs no locking. A failing room ends its own task and
//! disconnects its members without affecting the others.
//!
//! ### UDP-Based Communication
//! A single UDP socket serves every room. A receiver task decodes
//! datagrams, a sender task encodes and routes outbound packets to one
//! session or a whole room, and a checker task drops silent clients.
//!
//! ### Tick Pipeline
//! A tick runs the before-update hooks (player movement), one engine step,
//! the after-update hooks (floor cleanup and delta broadcast) and, when new
//! contacts appeared, the collision hooks that hand out fresh blocks.
//!
//! ## Module Organization
//!
//! - `physics`: engine boundary trait and the built-in engine
//! - `world`: players, controlled blocks, lanes and arena construction
//! - `input`: command parsing and per-tick movement
//! - `collision`: landing detection and respawning
//! - `sync`: delta and roster synchronizers
//! - `scheduler`: ordered hook execution around each engine step
//! - `room`: the room controller tying the above together
//! - `room_runner`: the per-room task
//! - `client_manager`: sessions, capacity and timeouts
//! - `network`: the UDP server and room registry
//! - `config`, `error`: tunables and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RoomConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", RoomConfig::default(), 32).await?;
//!
//!     // Runs until the process is stopped:
//!     // - accepts joins and routes them to rooms by name
//!     // - spawns a task per room that ticks at the configured rate
//!     // - broadcasts block and roster updates to each room's members
//!     // - drops clients that stop sending heartbeats
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod error;
pub mod input;
pub mod network;
pub mod physics;
pub mod room;
pub mod room_runner;
pub mod scheduler;
pub mod sync;
pub mod world;
