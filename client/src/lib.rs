//! # Block Room Client Library
//!
//! A thin, headless client for the block room server. It joins a room over
//! UDP, keeps the session alive with heartbeats and mirrors whatever the
//! room broadcasts. It never simulates anything itself.
//!
//! ## Module Organization
//!
//! ### Mirror Module (`mirror`)
//! Applies room messages to a local copy of the room:
//! - Roster patches keyed by user id
//! - Ready and started flags
//! - Block records, moved by accumulating broadcast deltas
//!
//! ### Network Module (`network`)
//! Manages the client side of the protocol:
//! - Join with protocol version and player profile
//! - Heartbeats every second
//! - Optional ready-up and start request
//! - Random bot input for soak testing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//! use shared::PlayerProfile;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions {
//!         room: "lobby".to_string(),
//!         profile: PlayerProfile {
//!             user_id: "bot-1".to_string(),
//!             display_name: "Bot".to_string(),
//!             avatar_ref: String::new(),
//!         },
//!         start: true,
//!         input_interval: Some(std::time::Duration::from_millis(250)),
//!         seed: None,
//!     };
//!     let mut client = Client::new("127.0.0.1:8080", options).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod mirror;
pub mod network;
