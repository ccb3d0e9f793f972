//! Drives one upgraded duplex link: a writer task draining the outbound
//! queue, a keep-alive pinger, and the inbound read loop.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{CloseFrame, Message, WebSocket, close_code},
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, interval_at, timeout, timeout_at},
};

use crate::{
    dto::{envelope::Command, standard},
    error::Error,
    state::{
        Game, Logger, Player, Severity,
        socket::{GameSocket, SocketChannels},
    },
};

/// Write deadline for ping/pong control frames.
const CONTROL_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Write deadline for the final close frame.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the socket is attached to, and therefore what happens to its inbound
/// frames and who gets told when it goes away.
pub(crate) enum SocketRole {
    Player { player: Arc<Player>, game: Arc<Game> },
    Spectator { game: Arc<Game> },
    Debug { logger: Logger },
}

impl SocketRole {
    fn logger(&self) -> &Logger {
        match self {
            SocketRole::Player { player, .. } => player.log(),
            SocketRole::Spectator { game } => game.log(),
            SocketRole::Debug { logger } => logger,
        }
    }
}

/// Drive an attached socket until either side closes the link, then detach it
/// from its owner.
pub(crate) async fn run(
    socket: WebSocket,
    link_timeout: Duration,
    handle: Arc<GameSocket>,
    channels: SocketChannels,
    role: SocketRole,
) {
    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_outbound(sink, channels.outbound, link_timeout));
    let pinger = tokio::spawn(keep_alive(
        Arc::clone(&handle),
        channels.done.clone(),
        link_timeout,
    ));

    read_loop(&mut stream, channels.done, &handle, &role, link_timeout).await;
    handle.disconnect();

    match &role {
        SocketRole::Player { player, .. } => player.detach(handle.id()).await,
        SocketRole::Spectator { game } => game.remove_spectator(handle.id()).await,
        SocketRole::Debug { logger } => logger.detach_debug(handle.id()),
    }

    let _ = pinger.await;
    let _ = writer.await;
}

/// Deliver a `cg_error` on a link that failed attachment, then close it.
pub(crate) async fn reject(
    socket: WebSocket,
    handle: Arc<GameSocket>,
    channels: SocketChannels,
    reason: String,
) {
    let (sink, _stream) = socket.split();
    let writer = tokio::spawn(write_outbound(
        sink,
        channels.outbound,
        CLOSE_WRITE_TIMEOUT,
    ));

    let _ = handle.send(standard::EVENT_ERROR, &standard::ErrorData { reason });
    handle.disconnect();
    let _ = writer.await;
}

/// Forward queued messages onto the wire, applying per-frame write deadlines.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    write_timeout: Duration,
) {
    while let Some(message) = outbound.recv().await {
        let deadline = match &message {
            Message::Ping(_) | Message::Pong(_) => CONTROL_WRITE_TIMEOUT,
            Message::Close(_) => CLOSE_WRITE_TIMEOUT,
            _ => write_timeout,
        };
        let closing = matches!(message, Message::Close(_));
        match timeout(deadline, sink.send(message)).await {
            Ok(Ok(())) if !closing => {}
            _ => break,
        }
    }
}

/// Queue a ping every nine tenths of the link timeout so a healthy peer's
/// pongs keep extending the read deadline.
async fn keep_alive(
    handle: Arc<GameSocket>,
    mut done: watch::Receiver<bool>,
    link_timeout: Duration,
) {
    let period = link_timeout * 9 / 10;
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = done.changed() => return,
            _ = ticker.tick() => {
                if handle.enqueue(Message::Ping(Bytes::new())).is_err() {
                    return;
                }
            }
        }
    }
}

async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    mut done: watch::Receiver<bool>,
    handle: &Arc<GameSocket>,
    role: &SocketRole,
    link_timeout: Duration,
) {
    let mut deadline = Instant::now() + link_timeout;
    loop {
        let message = tokio::select! {
            _ = done.changed() => return,
            next = timeout_at(deadline, stream.next()) => match next {
                Err(_) => {
                    role.logger()
                        .warning(format!("Socket {} missed its read deadline.", handle.id()));
                    return;
                }
                Ok(None) => return,
                Ok(Some(Err(err))) => {
                    role.logger().warning(format!(
                        "Socket {} disconnected unexpectedly: {err}",
                        handle.id()
                    ));
                    return;
                }
                Ok(Some(Ok(message))) => message,
            },
        };

        match message {
            Message::Pong(_) => {
                deadline = Instant::now() + link_timeout;
            }
            Message::Ping(payload) => {
                let _ = handle.enqueue(Message::Pong(payload));
            }
            Message::Close(frame) => {
                log_close(role, handle, frame.as_ref());
                return;
            }
            Message::Text(text) => handle_frame(role, handle, text.as_str()).await,
            // Non-text frames close the link.
            Message::Binary(_) => {
                let reason = Error::InvalidMessageType.to_string();
                role.logger()
                    .error(format!("Socket {} sent a non-text frame.", handle.id()));
                let _ = handle.send(standard::EVENT_ERROR, &standard::ErrorData { reason });
                return;
            }
        }
    }
}

fn log_close(role: &SocketRole, handle: &Arc<GameSocket>, frame: Option<&CloseFrame>) {
    let quiet = match frame {
        None => true,
        Some(frame) => matches!(
            frame.code,
            close_code::NORMAL | close_code::AWAY | close_code::STATUS | close_code::ABNORMAL
        ),
    };
    if quiet {
        role.logger()
            .trace(format!("Socket {} disconnected.", handle.id()));
    } else {
        role.logger().warning(format!(
            "Socket {} closed with code {}.",
            handle.id(),
            frame.map(|frame| frame.code).unwrap_or_default()
        ));
    }
}

async fn handle_frame(role: &SocketRole, handle: &Arc<GameSocket>, frame: &str) {
    match role {
        // Payloads are ignored; reading only keeps the link alive.
        SocketRole::Debug { .. } => {}
        SocketRole::Spectator { game } => {
            game.log().warning(format!(
                "Spectator socket {} sent an unexpected command.",
                handle.id()
            ));
        }
        SocketRole::Player { player, .. } => match Command::decode(frame) {
            Err(err) => {
                player.log().error(format!(
                    "Socket {} failed to decode command: {err}",
                    handle.id()
                ));
                send_error(handle, &err);
            }
            Ok(command) => {
                player.log().log_with(
                    Severity::Trace,
                    &command,
                    format!(
                        "Received '{}' command from socket {}.",
                        command.name,
                        handle.id()
                    ),
                );
                if let Err(err) = player.submit(command).await {
                    player
                        .log()
                        .error(format!("Failed to queue command: {err}"));
                    send_error(handle, &err);
                }
            }
        },
    }
}

fn send_error(handle: &Arc<GameSocket>, err: &Error) {
    let _ = handle.send(
        standard::EVENT_ERROR,
        &standard::ErrorData {
            reason: err.to_string(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn keep_alive_pings_at_nine_tenths_of_the_timeout() {
        let (handle, mut channels) = GameSocket::channel();
        let pinger = tokio::spawn(keep_alive(
            Arc::clone(&handle),
            channels.done.clone(),
            Duration::from_secs(10),
        ));

        tokio::time::advance(Duration::from_secs(8)).await;
        tokio::task::yield_now().await;
        assert!(channels.outbound.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let mut pinged = false;
        for _ in 0..16 {
            tokio::task::yield_now().await;
            if matches!(channels.outbound.try_recv(), Ok(Message::Ping(_))) {
                pinged = true;
                break;
            }
        }
        assert!(pinged);

        handle.disconnect();
        pinger.await.unwrap();
    }
}
