/// One live session with its players, spectators, and command queue.
pub mod game;
/// Debug-record fan-out per server/game/player scope.
pub mod logger;
/// Authenticated identities and their sockets.
pub mod player;
/// The game registry and inactivity reaper.
pub mod server;
/// Handles for upgraded duplex links.
pub mod socket;

pub use game::Game;
pub use logger::{Logger, Severity, SeverityFilter};
pub use player::Player;
pub use server::{PROTOCOL_VERSION, Server, SharedServer};
pub use socket::GameSocket;
