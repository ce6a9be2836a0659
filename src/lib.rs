//! Presence Relay Library
//!
//! A WebSocket presence and message relay built with tokio-tungstenite.
//!
//! # Features
//! - Rooms keyed by folder identifier, created on first join and removed
//!   when the last member leaves
//! - `joined` / `left` presence notifications and a `room_state` snapshot
//!   for every new member
//! - Opaque fan-out of application envelopes to every other room member
//! - Join rejection (close code 1008) when parameters are missing
//!
//! # Architecture
//! - `RoomRegistry` is the only owner of room membership, behind one lock
//! - Each connection has a `handler` task with separate read and write tasks
//! - Members receive frames through an unbounded channel, so a slow client
//!   never stalls a broadcast
//!
//! # Example
//! ```ignore
//! use presence_relay::RelayServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = RelayServer::bind("127.0.0.1:3001").await.unwrap();
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod member;
pub mod message;
pub mod params;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use member::Member;
pub use message::{Envelope, Presence, PresenceData, UserSummary};
pub use params::JoinParams;
pub use registry::{Departure, RoomRegistry};
pub use room::Room;
pub use server::RelayServer;
pub use types::{ConnectionId, RoomId, UserId};
