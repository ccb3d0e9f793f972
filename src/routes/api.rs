//! REST endpoints under `/api`.

use std::{io::ErrorKind, path::Path as FsPath};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::api::{
        CreateGameRequest, CreateGameResponse, GameListEntry, GameResponse, InfoResponse,
        JoinGameRequest, JoinGameResponse, ListGamesQuery, ListGamesResponse, PlayerResponse,
        PlayerUsernames,
    },
    error::{ApiError, Error},
    state::{PROTOCOL_VERSION, SharedServer},
};

/// Discovery, lifecycle, and resource endpoints.
pub fn router() -> Router<SharedServer> {
    Router::new()
        .route("/info", get(info))
        .route("/events", get(events))
        .route("/logo", get(logo))
        .route("/games", get(list_games).post(create_game))
        .route("/games/{game_id}", get(get_game))
        .route(
            "/games/{game_id}/players",
            get(list_players).post(join_game),
        )
        .route("/games/{game_id}/players/{player_id}", get(get_player))
}

/// Server metadata for client discovery.
#[utoipa::path(
    get,
    path = "/info",
    tag = "server",
    responses((status = 200, description = "Server metadata", body = InfoResponse))
)]
pub async fn info(State(server): State<SharedServer>) -> Json<InfoResponse> {
    let config = server.config();
    Json(InfoResponse {
        name: config.name.clone(),
        cg_version: PROTOCOL_VERSION.to_owned(),
        display_name: config.display_name.clone(),
        description: config.description.clone(),
        version: config.version.clone(),
        repository_url: config.repository_url.clone(),
    })
}

/// The event-schema file for the hosted game, served verbatim.
#[utoipa::path(
    get,
    path = "/events",
    tag = "server",
    responses(
        (status = 200, description = "Event-schema file contents"),
        (status = 404, description = "No event-schema file configured")
    )
)]
pub async fn events(State(server): State<SharedServer>) -> Response {
    serve_file(
        server.config().events_path.as_deref(),
        "text/plain; charset=utf-8",
    )
    .await
}

/// The logo of the hosted game.
#[utoipa::path(
    get,
    path = "/logo",
    tag = "server",
    responses(
        (status = 200, description = "Logo file contents"),
        (status = 404, description = "No logo configured")
    )
)]
pub async fn logo(State(server): State<SharedServer>) -> Response {
    serve_file(
        server.config().logo_path.as_deref(),
        "application/octet-stream",
    )
    .await
}

async fn serve_file(path: Option<&FsPath>, content_type: &'static str) -> Response {
    let Some(path) = path else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to read served file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// List public games and count private ones.
#[utoipa::path(
    get,
    path = "/games",
    tag = "games",
    responses((status = 200, description = "Current games", body = ListGamesResponse))
)]
pub async fn list_games(
    State(server): State<SharedServer>,
    Query(query): Query<ListGamesQuery>,
) -> Json<ListGamesResponse> {
    let mut public = Vec::new();
    let mut private = 0;
    for game in server.games_snapshot().await {
        if let Some(protected) = query.protected {
            if protected != game.is_protected() {
                continue;
            }
        }
        if game.is_public() {
            public.push(GameListEntry {
                id: game.id(),
                players: game.player_count().await,
                protected: game.is_protected(),
            });
        } else {
            private += 1;
        }
    }
    Json(ListGamesResponse { private, public })
}

/// Create a new game.
#[utoipa::path(
    post,
    path = "/games",
    tag = "games",
    request_body = CreateGameRequest,
    responses(
        (status = 201, description = "Game created", body = CreateGameResponse),
        (status = 403, description = "Max game count reached")
    )
)]
pub async fn create_game(
    State(server): State<SharedServer>,
    Json(body): Json<CreateGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (game_id, join_secret) = server
        .create_game(body.public, body.protected, body.config)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateGameResponse {
            game_id,
            join_secret,
        }),
    ))
}

/// Details of one game.
#[utoipa::path(
    get,
    path = "/games/{game_id}",
    tag = "games",
    params(("game_id" = Uuid, Path, description = "Game to look up")),
    responses(
        (status = 200, description = "Game details", body = GameResponse),
        (status = 404, description = "Game not found")
    )
)]
pub async fn get_game(
    State(server): State<SharedServer>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<GameResponse>, ApiError> {
    let game = server.game(game_id).await.ok_or(Error::GameNotFound)?;
    Ok(Json(GameResponse {
        id: game.id(),
        players: game.player_count().await,
        protected: game.is_protected(),
        config: game.config_value(),
    }))
}

/// The game's roster: player IDs mapped to usernames.
#[utoipa::path(
    get,
    path = "/games/{game_id}/players",
    tag = "games",
    params(("game_id" = Uuid, Path, description = "Game to look up")),
    responses(
        (status = 200, description = "Player IDs mapped to usernames"),
        (status = 404, description = "Game not found")
    )
)]
pub async fn list_players(
    State(server): State<SharedServer>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<PlayerUsernames>, ApiError> {
    let game = server.game(game_id).await.ok_or(Error::GameNotFound)?;
    Ok(Json(game.username_map().await))
}

/// Join a game, creating a new player.
#[utoipa::path(
    post,
    path = "/games/{game_id}/players",
    tag = "games",
    params(("game_id" = Uuid, Path, description = "Game to join")),
    request_body = JoinGameRequest,
    responses(
        (status = 201, description = "Player created", body = JoinGameResponse),
        (status = 400, description = "Invalid request body"),
        (status = 403, description = "Wrong join secret or max player count reached"),
        (status = 404, description = "Game not found")
    )
)]
pub async fn join_game(
    State(server): State<SharedServer>,
    Path(game_id): Path<Uuid>,
    Json(body): Json<JoinGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()
        .map_err(|_| ApiError::BadRequest("invalid request body".into()))?;
    let game = server.game(game_id).await.ok_or(Error::GameNotFound)?;
    let (player_id, player_secret) = game.join(&body.username, &body.join_secret).await?;
    Ok((
        StatusCode::CREATED,
        Json(JoinGameResponse {
            player_id,
            player_secret,
        }),
    ))
}

/// Details of one player.
#[utoipa::path(
    get,
    path = "/games/{game_id}/players/{player_id}",
    tag = "games",
    params(
        ("game_id" = Uuid, Path, description = "Game to look up"),
        ("player_id" = Uuid, Path, description = "Player to look up")
    ),
    responses(
        (status = 200, description = "Player details", body = PlayerResponse),
        (status = 404, description = "Game or player not found")
    )
)]
pub async fn get_player(
    State(server): State<SharedServer>,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let game = server.game(game_id).await.ok_or(Error::GameNotFound)?;
    let player = game.player(player_id).await.ok_or(Error::PlayerNotFound)?;
    Ok(Json(PlayerResponse {
        username: player.username().to_owned(),
    }))
}
