use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

/// Errors surfaced by the session and messaging core.
#[derive(Debug, Error)]
pub enum Error {
    /// A client sent something other than a text frame.
    #[error("invalid message type")]
    InvalidMessageType,
    /// A frame could not be decoded into a command, or the envelope name was empty.
    #[error("failed to decode command")]
    DecodeFailed(#[source] Option<serde_json::Error>),
    /// An event payload could not be encoded as JSON.
    #[error("failed to encode json object")]
    EncodeFailed(#[source] serde_json::Error),
    #[error("wrong join secret")]
    WrongJoinSecret,
    #[error("wrong player secret")]
    WrongPlayerSecret,
    #[error("max game count reached")]
    MaxGamesReached,
    #[error("max player count reached")]
    MaxPlayersReached,
    #[error("max spectator count reached")]
    MaxSpectatorsReached,
    #[error("max socket count reached for this player")]
    MaxSocketsReached,
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
    /// The game has already been closed.
    #[error("game is closed")]
    GameClosed,
    /// The player has been removed from its game.
    #[error("player is not part of a game")]
    PlayerDetached,
    /// The peer went away while a frame was queued for it.
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error type returned by the HTTP boundary.
///
/// Reasons are sent as plain-text bodies so clients can show them verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::WrongJoinSecret
            | Error::WrongPlayerSecret
            | Error::MaxGamesReached
            | Error::MaxPlayersReached
            | Error::MaxSpectatorsReached
            | Error::MaxSocketsReached => ApiError::Forbidden(err.to_string()),
            Error::GameNotFound | Error::PlayerNotFound => ApiError::NotFound(err.to_string()),
            Error::InvalidMessageType | Error::DecodeFailed(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
