//! Upgrade endpoints: player sockets, spectators, and debug streams.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        api::{DebugSeveritiesQuery, PlayerSecretQuery},
        standard,
    },
    error::{ApiError, Error},
    services::{
        debug_service,
        socket_service::{self, SocketRole},
    },
    state::{Game, GameSocket, Player, SeverityFilter, SharedServer, server::secrets_match},
};

pub fn router() -> Router<SharedServer> {
    Router::new()
        .route(
            "/games/{game_id}/players/{player_id}/connect",
            get(connect_player),
        )
        .route("/games/{game_id}/spectate", get(spectate))
        .route("/debug", get(debug_server))
        .route("/games/{game_id}/debug", get(debug_game))
        .route(
            "/games/{game_id}/players/{player_id}/debug",
            get(debug_player),
        )
}

/// Attach a new socket to an existing player.
///
/// The player secret is compared in constant time. Capacity failures happen
/// after the upgrade and surface as a `cg_error` event before the close.
#[utoipa::path(
    get,
    path = "/games/{game_id}/players/{player_id}/connect",
    tag = "sockets",
    params(
        ("game_id" = Uuid, Path, description = "Game the player belongs to"),
        ("player_id" = Uuid, Path, description = "Player to attach to"),
        ("player_secret" = String, Query, description = "Secret returned when the player joined")
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Missing player secret"),
        (status = 403, description = "Wrong player secret"),
        (status = 404, description = "Game or player not found")
    )
)]
pub async fn connect_player(
    State(server): State<SharedServer>,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PlayerSecretQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let (game, player) = match authenticate_player(&server, game_id, player_id, &query).await {
        Ok(found) => found,
        Err(err) => return err.into_response(),
    };

    let link_timeout = server.config().websocket_timeout;
    ws.on_upgrade(move |socket| async move {
        let (handle, channels) = GameSocket::channel();
        match player.attach(Arc::clone(&handle)).await {
            Ok(()) => {
                server.log().trace(format!(
                    "Socket {} connected to player {}.",
                    handle.id(),
                    player.id()
                ));
                game.notify_player_socket_connected(&player, &handle);
                let _ = handle.send(standard::EVENT_CONNECTED, &standard::ConnectedData {});
                let _ = handle.send(
                    standard::EVENT_INFO,
                    &standard::InfoData {
                        players: game.username_map().await,
                    },
                );
                socket_service::run(
                    socket,
                    link_timeout,
                    handle,
                    channels,
                    SocketRole::Player { player, game },
                )
                .await;
            }
            Err(err) => {
                socket_service::reject(socket, handle, channels, err.to_string()).await;
            }
        }
    })
}

/// Attach a read-only spectator socket to a game.
#[utoipa::path(
    get,
    path = "/games/{game_id}/spectate",
    tag = "sockets",
    params(("game_id" = Uuid, Path, description = "Game to spectate")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Game not found")
    )
)]
pub async fn spectate(
    State(server): State<SharedServer>,
    Path(game_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(game) = server.game(game_id).await else {
        return ApiError::from(Error::GameNotFound).into_response();
    };

    let link_timeout = server.config().websocket_timeout;
    ws.on_upgrade(move |socket| async move {
        let (handle, channels) = GameSocket::channel();
        match game.add_spectator(Arc::clone(&handle)).await {
            Ok(()) => {
                socket_service::run(
                    socket,
                    link_timeout,
                    handle,
                    channels,
                    SocketRole::Spectator { game },
                )
                .await;
            }
            Err(err) => {
                socket_service::reject(socket, handle, channels, err.to_string()).await;
            }
        }
    })
}

/// Stream server-scope debug records.
pub async fn debug_server(
    State(server): State<SharedServer>,
    Query(query): Query<DebugSeveritiesQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let filter = SeverityFilter::from(&query);
    let link_timeout = server.config().websocket_timeout;
    let logger = server.log().clone();
    ws.on_upgrade(move |socket| debug_service::run(socket, link_timeout, logger, filter))
}

/// Stream debug records scoped to one game.
pub async fn debug_game(
    State(server): State<SharedServer>,
    Path(game_id): Path<Uuid>,
    Query(query): Query<DebugSeveritiesQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(game) = server.game(game_id).await else {
        return ApiError::from(Error::GameNotFound).into_response();
    };

    let filter = SeverityFilter::from(&query);
    let link_timeout = server.config().websocket_timeout;
    let logger = game.log().clone();
    ws.on_upgrade(move |socket| debug_service::run(socket, link_timeout, logger, filter))
}

/// Stream debug records scoped to one player. Requires the player secret.
pub async fn debug_player(
    State(server): State<SharedServer>,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
    Query(secret_query): Query<PlayerSecretQuery>,
    Query(query): Query<DebugSeveritiesQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let (_, player) = match authenticate_player(&server, game_id, player_id, &secret_query).await {
        Ok(found) => found,
        Err(err) => return err.into_response(),
    };

    let filter = SeverityFilter::from(&query);
    let link_timeout = server.config().websocket_timeout;
    let logger = player.log().clone();
    ws.on_upgrade(move |socket| debug_service::run(socket, link_timeout, logger, filter))
}

/// Resolve a game/player pair and verify the supplied player secret.
async fn authenticate_player(
    server: &SharedServer,
    game_id: Uuid,
    player_id: Uuid,
    query: &PlayerSecretQuery,
) -> Result<(Arc<Game>, Arc<Player>), ApiError> {
    let Some(secret) = &query.player_secret else {
        return Err(ApiError::BadRequest(
            "missing `player_secret` query parameter".into(),
        ));
    };
    let game = server.game(game_id).await.ok_or(Error::GameNotFound)?;
    let player = game.player(player_id).await.ok_or(Error::PlayerNotFound)?;
    if !secrets_match(player.secret(), secret) {
        return Err(Error::WrongPlayerSecret.into());
    }
    Ok((game, player))
}
