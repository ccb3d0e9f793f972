//! Request and response bodies for the REST part of the `/api` surface.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Server metadata returned by `GET /api/info`.
#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    /// Machine-readable server name.
    pub name: String,
    /// Protocol version spoken by this server.
    pub cg_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
}

/// Query accepted by `GET /api/games`.
#[derive(Debug, Deserialize)]
pub struct ListGamesQuery {
    /// When present, only count games whose protection matches the flag.
    pub protected: Option<bool>,
}

/// One publicly listed game.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameListEntry {
    pub id: Uuid,
    /// Current number of players.
    pub players: usize,
    /// Whether a join secret is required.
    pub protected: bool,
}

/// Response of `GET /api/games`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListGamesResponse {
    /// Number of unlisted games; their IDs are never revealed.
    pub private: usize,
    pub public: Vec<GameListEntry>,
}

/// Body of `POST /api/games`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGameRequest {
    /// List the game publicly.
    pub public: bool,
    /// Guard the game with a generated join secret.
    #[serde(default)]
    pub protected: bool,
    /// Opaque configuration forwarded to the game logic.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Option<serde_json::Value>,
}

/// Response of `POST /api/games`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateGameResponse {
    pub game_id: Uuid,
    /// Present iff the game was created protected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_secret: Option<String>,
}

/// Response of `GET /api/games/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameResponse {
    pub id: Uuid,
    pub players: usize,
    pub protected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub config: Option<serde_json::Value>,
}

/// Body of `POST /api/games/{id}/players`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinGameRequest {
    /// Display name of the new player.
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    /// Required when the game is protected.
    #[serde(default)]
    pub join_secret: String,
}

/// Response of `POST /api/games/{id}/players`.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinGameResponse {
    pub player_id: Uuid,
    /// Needed to attach sockets on the player's behalf.
    pub player_secret: String,
}

/// Response of `GET /api/games/{id}/players`: player IDs mapped to usernames.
pub type PlayerUsernames = IndexMap<Uuid, String>;

/// Response of `GET /api/games/{id}/players/{pid}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerResponse {
    pub username: String,
}

/// Query accepted by the `/connect` and player-scope `/debug` upgrades.
#[derive(Debug, Deserialize)]
pub struct PlayerSecretQuery {
    pub player_secret: Option<String>,
}

/// Severity toggles accepted by the debug upgrades; omitted means enabled.
#[derive(Debug, Default, Deserialize)]
pub struct DebugSeveritiesQuery {
    pub trace: Option<bool>,
    pub info: Option<bool>,
    pub warning: Option<bool>,
    pub error: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn join_request_rejects_empty_usernames() {
        let request = JoinGameRequest {
            username: String::new(),
            join_secret: String::new(),
        };
        assert!(request.validate().is_err());

        let request = JoinGameRequest {
            username: "alice".into(),
            join_secret: String::new(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn join_secret_defaults_to_empty() {
        let request: JoinGameRequest = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(request.join_secret, "");
    }

    #[test]
    fn create_game_response_omits_absent_join_secret() {
        let body = serde_json::to_string(&CreateGameResponse {
            game_id: Uuid::nil(),
            join_secret: None,
        })
        .unwrap();
        assert!(!body.contains("join_secret"));
    }
}
