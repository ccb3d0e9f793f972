//! Standard events reserved by the protocol under the `cg_` name prefix.
//!
//! Anything outside this list is an application event and passes through the
//! core untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request creation of a new game.
pub const EVENT_CREATE: &str = "cg_create";
/// Confirms game creation to the requesting client.
pub const EVENT_CREATED: &str = "cg_created";
/// Request to join an existing game.
pub const EVENT_JOIN: &str = "cg_join";
/// Confirms a join and delivers the player secret.
pub const EVENT_JOINED: &str = "cg_joined";
/// Broadcast to the whole game when a player joins.
pub const EVENT_NEW_PLAYER: &str = "cg_new_player";
/// Request to leave the current game.
pub const EVENT_LEAVE: &str = "cg_leave";
/// Broadcast to the whole game when a player leaves.
pub const EVENT_LEFT: &str = "cg_left";
/// Request to associate a socket with an existing player.
pub const EVENT_CONNECT: &str = "cg_connect";
/// Confirms the socket association to the connecting socket.
pub const EVENT_CONNECTED: &str = "cg_connected";
/// Catches a freshly attached socket up on the current game roster.
pub const EVENT_INFO: &str = "cg_info";
/// Reports a technical error to the client that triggered it.
pub const EVENT_ERROR: &str = "cg_error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateData {
    /// Whether the new game should be listed publicly.
    pub public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedData {
    /// The ID of the game that was created.
    pub game_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinData {
    /// The ID of the game to join.
    pub game_id: Uuid,
    /// Desired username.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedData {
    /// Secret needed to reconnect or to attach further sockets.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayerData {
    /// Username of the player that just joined.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveData {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeftData {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectData {
    pub game_id: Uuid,
    pub player_id: Uuid,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedData {}

/// Roster snapshot sent to sockets that just attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoData {
    /// All player IDs currently in the game mapped to their usernames.
    pub players: IndexMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    /// Why the error occurred.
    pub reason: String,
}

/// Returns true if `name` is one of the reserved standard events.
pub fn is_standard_event(name: &str) -> bool {
    matches!(
        name,
        EVENT_CREATE
            | EVENT_CREATED
            | EVENT_JOIN
            | EVENT_JOINED
            | EVENT_NEW_PLAYER
            | EVENT_LEAVE
            | EVENT_LEFT
            | EVENT_CONNECT
            | EVENT_CONNECTED
            | EVENT_INFO
            | EVENT_ERROR
    )
}
