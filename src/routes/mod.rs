use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedServer;

/// REST endpoints.
pub mod api;
/// Swagger UI.
pub mod docs;
/// Static frontend serving.
pub mod frontend;
/// WebSocket upgrade endpoints.
pub mod ws;

/// Compose the full HTTP surface and attach cross-cutting middleware layers.
pub fn router(server: SharedServer) -> Router<()> {
    let api_router = api::router().merge(ws::router());

    let mut app = Router::new()
        .nest("/api", api_router)
        .merge(docs::router(server.clone()));

    if let Some(web_root) = &server.config().web_root {
        app = app.fallback_service(frontend::service(web_root));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
