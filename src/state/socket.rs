//! Handle for one upgraded duplex link.
//!
//! The handle only enqueues frames; a writer task owned by the socket service
//! drains the queue onto the wire so senders never block on a slow peer.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, close_code};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{dto::envelope::Event, error::Error};

/// One upgraded client link, registered with whichever entity owns it
/// semantically (a player, a game's spectator set, or a logger).
#[derive(Debug)]
pub struct GameSocket {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
    done: watch::Sender<bool>,
    closed: AtomicBool,
}

/// Receiving halves handed to the socket service that drives the link.
pub(crate) struct SocketChannels {
    pub outbound: mpsc::UnboundedReceiver<Message>,
    pub done: watch::Receiver<bool>,
}

impl GameSocket {
    /// Create a socket handle together with the channels its driver consumes.
    pub(crate) fn channel() -> (std::sync::Arc<Self>, SocketChannels) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let socket = std::sync::Arc::new(Self {
            id: Uuid::new_v4(),
            outbound: outbound_tx,
            done: done_tx,
            closed: AtomicBool::new(false),
        });
        (
            socket,
            SocketChannels {
                outbound: outbound_rx,
                done: done_rx,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send one event to this socket only.
    pub fn send<T: Serialize + ?Sized>(&self, name: &str, payload: &T) -> Result<(), Error> {
        let frame = Event::new(name, payload)?.encode()?;
        self.send_frame(&frame)
    }

    /// Enqueue one already-encoded text frame.
    pub(crate) fn send_frame(&self, frame: &str) -> Result<(), Error> {
        self.enqueue(Message::Text(frame.into()))
    }

    /// Enqueue a raw websocket message for the writer task.
    pub(crate) fn enqueue(&self, message: Message) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.outbound
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Signal the driver tasks and queue a normal-closure frame. Idempotent.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "disconnect".into(),
        })));
        self.done.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_the_writer_queue_in_order() {
        let (socket, mut channels) = GameSocket::channel();
        socket.send("first", &1).unwrap();
        socket.send("second", &2).unwrap();

        for expected in [r#"{"name":"first","data":1}"#, r#"{"name":"second","data":2}"#] {
            match channels.outbound.recv().await.unwrap() {
                Message::Text(text) => assert_eq!(text.as_str(), expected),
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_signals_done() {
        let (socket, mut channels) = GameSocket::channel();
        socket.disconnect();
        socket.disconnect();

        assert!(*channels.done.borrow_and_update());
        assert!(matches!(
            channels.outbound.recv().await,
            Some(Message::Close(Some(_)))
        ));
        // The second disconnect queued nothing further.
        assert!(matches!(channels.outbound.try_recv(), Err(_)));
        assert!(socket.send_frame("late").is_err());
    }
}
