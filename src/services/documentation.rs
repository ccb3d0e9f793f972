use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the `/api` surface.
#[openapi(
    paths(
        crate::routes::api::info,
        crate::routes::api::events,
        crate::routes::api::logo,
        crate::routes::api::list_games,
        crate::routes::api::create_game,
        crate::routes::api::get_game,
        crate::routes::api::list_players,
        crate::routes::api::join_game,
        crate::routes::api::get_player,
        crate::routes::ws::connect_player,
        crate::routes::ws::spectate,
    ),
    components(
        schemas(
            crate::dto::api::InfoResponse,
            crate::dto::api::GameListEntry,
            crate::dto::api::ListGamesResponse,
            crate::dto::api::CreateGameRequest,
            crate::dto::api::CreateGameResponse,
            crate::dto::api::GameResponse,
            crate::dto::api::JoinGameRequest,
            crate::dto::api::JoinGameResponse,
            crate::dto::api::PlayerResponse,
        )
    ),
    tags(
        (name = "server", description = "Discovery and resource endpoints"),
        (name = "games", description = "Game and player lifecycle"),
        (name = "sockets", description = "WebSocket upgrade endpoints"),
    )
)]
pub struct ApiDoc;
