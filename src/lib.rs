//! Realtime game-session server library for turn- and tick-based multiplayer
//! games.
//!
//! The server hosts any number of concurrently live games. Clients discover
//! and join games over a small REST surface, then upgrade to WebSocket links
//! that carry JSON `{name, data}` frames: commands from clients, events from
//! the game logic.
//!
//! ```no_run
//! use playroom::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         name: "checkers".into(),
//!         ..ServerConfig::default()
//!     };
//!     let server = Server::new(config, |game, _config| async move {
//!         while let Some(wrapper) = game.wait_next_command().await {
//!             // interpret the command, update state, then publish events
//!             let _ = game.send("board_changed", &()).await;
//!             let _ = wrapper.player.send("ack", &wrapper.command.name).await;
//!         }
//!     });
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub(crate) mod services;
pub mod state;

pub use config::ServerConfig;
pub use dto::envelope::{Command, CommandWrapper, Event};
pub use error::Error;
pub use state::{
    Game, GameSocket, Logger, PROTOCOL_VERSION, Player, Server, Severity, SharedServer,
};
