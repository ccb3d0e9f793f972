//! Attaches upgraded links to a logger as debug streams.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::WebSocket;

use crate::{
    services::socket_service::{self, SocketRole},
    state::{GameSocket, Logger, SeverityFilter},
};

/// Register a debug stream on `logger` and drive it until it closes.
///
/// Inbound payloads are ignored; the read loop only exists so pongs keep the
/// link alive.
pub(crate) async fn run(
    socket: WebSocket,
    link_timeout: Duration,
    logger: Logger,
    filter: SeverityFilter,
) {
    let (handle, channels) = GameSocket::channel();
    logger.attach_debug(Arc::clone(&handle), filter);
    socket_service::run(
        socket,
        link_timeout,
        handle,
        channels,
        SocketRole::Debug { logger },
    )
    .await;
}
