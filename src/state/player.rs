//! An authenticated identity inside one game.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak},
};

use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    dto::envelope::{Command, CommandWrapper, Event},
    error::Error,
    state::{
        game::Game,
        logger::{Logger, Severity},
        socket::GameSocket,
    },
};

/// Soft cap on buffered missed events; the oldest frames are dropped first.
const MAX_MISSED_EVENTS: usize = 1024;

/// A player may own several sockets at once (say, a bot process plus a
/// browser view). Events sent while no socket is attached are buffered and
/// replayed to the next socket that attaches.
pub struct Player {
    id: Uuid,
    username: String,
    secret: String,
    log: Logger,
    config: Arc<ServerConfig>,
    game: StdRwLock<Weak<Game>>,
    sockets: RwLock<HashMap<Uuid, Arc<GameSocket>>>,
    last_connection: StdMutex<Instant>,
    missed_events: Mutex<VecDeque<String>>,
}

impl Player {
    pub(crate) fn new(
        username: String,
        secret: String,
        game: Weak<Game>,
        config: Arc<ServerConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            username,
            secret,
            log: Logger::new(false),
            config,
            game: StdRwLock::new(game),
            sockets: RwLock::new(HashMap::new()),
            last_connection: StdMutex::new(Instant::now()),
            missed_events: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Token a client must present to attach a socket on this player's behalf.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Debug scope covering only this player.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Number of currently attached sockets.
    pub async fn socket_count(&self) -> usize {
        self.sockets.read().await.len()
    }

    /// Send one event to every attached socket, or buffer it if there is none.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        name: &str,
        payload: &T,
    ) -> Result<(), Error> {
        let event = Event::new(name, payload)?;
        self.log
            .log_with(Severity::Trace, &event, format!("Sending '{name}' event..."));
        self.send_encoded(&event.encode()?).await;
        Ok(())
    }

    /// Fan an already-encoded frame out to the attached sockets.
    ///
    /// Individual socket failures are tolerated; a dead socket reaps itself
    /// through its read loop.
    pub(crate) async fn send_encoded(&self, frame: &str) {
        let sockets = self.sockets.read().await;
        for socket in sockets.values() {
            let _ = socket.send_frame(frame);
        }

        if sockets.is_empty() {
            let mut missed = self.missed_events.lock().await;
            if missed.len() >= MAX_MISSED_EVENTS {
                missed.pop_front();
                self.log.warning("missed-event buffer full, dropping oldest event");
            }
            missed.push_back(frame.to_owned());
        }
    }

    /// Enqueue a command into the owning game on this player's behalf.
    pub async fn submit(self: &Arc<Self>, command: Command) -> Result<(), Error> {
        let game = self
            .game
            .read()
            .expect("game lock")
            .upgrade()
            .ok_or(Error::PlayerDetached)?;
        game.enqueue_command(CommandWrapper {
            player: Arc::clone(self),
            command,
        })
        .await
    }

    /// Leave the owning game, disconnecting every socket.
    pub async fn leave(self: &Arc<Self>) -> Result<(), Error> {
        let game = self
            .game
            .read()
            .expect("game lock")
            .upgrade()
            .ok_or(Error::PlayerDetached)?;
        game.leave(self).await;
        Ok(())
    }

    /// Register a new socket and replay any missed events to it in order.
    pub(crate) async fn attach(&self, socket: Arc<GameSocket>) -> Result<(), Error> {
        {
            let mut sockets = self.sockets.write().await;
            let cap = self.config.max_sockets_per_player;
            if cap > 0 && sockets.len() >= cap {
                return Err(Error::MaxSocketsReached);
            }
            sockets.insert(socket.id(), Arc::clone(&socket));
        }

        let mut missed = self.missed_events.lock().await;
        for frame in missed.drain(..) {
            let _ = socket.send_frame(&frame);
        }
        Ok(())
    }

    /// Disconnect and forget one socket. No-op for unknown IDs.
    pub(crate) async fn detach(&self, id: Uuid) {
        let removed = self.sockets.write().await.remove(&id);
        if let Some(socket) = removed {
            socket.disconnect();
            *self.last_connection.lock().expect("last connection lock") = Instant::now();
        }
    }

    /// Disconnect every socket, stamping the inactivity timestamp.
    pub(crate) async fn disconnect_all(&self) {
        let ids: Vec<Uuid> = self.sockets.read().await.keys().copied().collect();
        for id in ids {
            self.detach(id).await;
        }
    }

    /// When the last socket detached; used by the inactivity reaper.
    pub(crate) fn last_connection(&self) -> Instant {
        *self.last_connection.lock().expect("last connection lock")
    }

    /// Drop the upward game handle once the game has removed this player.
    pub(crate) fn clear_game(&self) {
        *self.game.write().expect("game lock") = Weak::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;

    fn player(max_sockets: usize) -> Arc<Player> {
        let config = Arc::new(ServerConfig {
            max_sockets_per_player: max_sockets,
            ..ServerConfig::default()
        });
        Player::new("alice".into(), "secret".into(), Weak::new(), config)
    }

    fn frames(channels: &mut crate::state::socket::SocketChannels) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = channels.outbound.try_recv() {
            out.push(text.to_string());
        }
        out
    }

    #[tokio::test]
    async fn socket_cap_applies_to_current_holdings_only() {
        let player = player(1);
        let (first, _first_channels) = GameSocket::channel();
        let first_id = first.id();
        player.attach(first).await.unwrap();

        let (second, _second_channels) = GameSocket::channel();
        assert!(matches!(
            player.attach(Arc::clone(&second)).await,
            Err(Error::MaxSocketsReached)
        ));

        // Detaching frees the slot again.
        player.detach(first_id).await;
        player.attach(second).await.unwrap();
        assert_eq!(player.socket_count().await, 1);
    }

    #[tokio::test]
    async fn events_reach_every_attached_socket() {
        let player = player(0);
        let (first, mut first_channels) = GameSocket::channel();
        let (second, mut second_channels) = GameSocket::channel();
        player.attach(first).await.unwrap();
        player.attach(second).await.unwrap();

        player.send("tick", &1).await.unwrap();

        for channels in [&mut first_channels, &mut second_channels] {
            assert_eq!(frames(channels), vec![r#"{"name":"tick","data":1}"#]);
        }
    }

    #[tokio::test]
    async fn missed_events_replay_in_order_on_attach() {
        let player = player(0);
        player.send("x", &2).await.unwrap();
        player.send("y", &3).await.unwrap();
        assert_eq!(player.missed_events.lock().await.len(), 2);

        let (socket, mut channels) = GameSocket::channel();
        player.attach(socket).await.unwrap();

        assert_eq!(
            frames(&mut channels),
            vec![r#"{"name":"x","data":2}"#, r#"{"name":"y","data":3}"#]
        );
        assert!(player.missed_events.lock().await.is_empty());

        // Live streaming resumes after the replay.
        player.send("z", &4).await.unwrap();
        assert_eq!(frames(&mut channels), vec![r#"{"name":"z","data":4}"#]);
    }

    #[tokio::test]
    async fn missed_event_buffer_drops_oldest_beyond_cap() {
        let player = player(0);
        for i in 0..(MAX_MISSED_EVENTS + 5) {
            player.send_encoded(&format!("frame-{i}")).await;
        }

        let missed = player.missed_events.lock().await;
        assert_eq!(missed.len(), MAX_MISSED_EVENTS);
        assert_eq!(missed.front().unwrap(), "frame-5");
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_closes_the_socket() {
        let player = player(0);
        let (socket, mut channels) = GameSocket::channel();
        let id = socket.id();
        player.attach(socket).await.unwrap();

        player.detach(id).await;
        player.detach(id).await;
        assert_eq!(player.socket_count().await, 0);
        assert!(matches!(
            channels.outbound.recv().await,
            Some(Message::Close(_))
        ));
    }

    #[tokio::test]
    async fn submit_fails_once_removed_from_the_game() {
        let player = player(0);
        let command = Command::decode(r#"{"name":"noop"}"#).unwrap();
        assert!(matches!(
            player.submit(command).await,
            Err(Error::PlayerDetached)
        ));
    }
}
