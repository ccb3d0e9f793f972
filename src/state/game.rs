//! One live session: players, spectators, and the command queue feeding the
//! author's game logic.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use indexmap::IndexMap;
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock, mpsc},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    dto::{
        envelope::{CommandWrapper, Event},
        standard,
    },
    error::Error,
    state::{
        logger::{Logger, Severity},
        player::Player,
        server::{Server, secrets_match},
        socket::GameSocket,
    },
};

/// Commands a slow game-logic consumer may leave pending before producers
/// start awaiting a free slot. Commands are never dropped.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 10;

type PlayerHook = Box<dyn Fn(&Arc<Player>) + Send + Sync>;
type PlayerSocketHook = Box<dyn Fn(&Arc<Player>, &Arc<GameSocket>) + Send + Sync>;
type SpectatorHook = Box<dyn Fn(&Arc<GameSocket>) + Send + Sync>;

/// Optional author callbacks, invoked synchronously from the triggering
/// operation.
#[derive(Default)]
struct GameHooks {
    player_joined: Option<PlayerHook>,
    player_left: Option<PlayerHook>,
    player_socket_connected: Option<PlayerSocketHook>,
    spectator_connected: Option<SpectatorHook>,
}

pub struct Game {
    id: Uuid,
    public: bool,
    join_secret: Option<String>,
    log: Logger,
    config: Arc<ServerConfig>,
    server: Weak<Server>,
    game_config: StdRwLock<Option<serde_json::Value>>,
    players: RwLock<IndexMap<Uuid, Arc<Player>>>,
    spectators: RwLock<HashMap<Uuid, Arc<GameSocket>>>,
    commands_tx: StdMutex<Option<mpsc::Sender<CommandWrapper>>>,
    commands_rx: Mutex<mpsc::Receiver<CommandWrapper>>,
    hooks: StdRwLock<GameHooks>,
    running: AtomicBool,
    marked_empty_at: StdMutex<Option<Instant>>,
}

impl Game {
    pub(crate) fn new(
        server: Weak<Server>,
        config: Arc<ServerConfig>,
        public: bool,
        join_secret: Option<String>,
    ) -> Arc<Self> {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        Arc::new(Self {
            id: Uuid::new_v4(),
            public,
            join_secret,
            log: Logger::new(false),
            config,
            server,
            game_config: StdRwLock::new(None),
            players: RwLock::new(IndexMap::new()),
            spectators: RwLock::new(HashMap::new()),
            commands_tx: StdMutex::new(Some(commands_tx)),
            commands_rx: Mutex::new(commands_rx),
            hooks: StdRwLock::new(GameHooks::default()),
            running: AtomicBool::new(true),
            // A fresh game has no players yet, so the empty stamp starts set.
            marked_empty_at: StdMutex::new(Some(Instant::now())),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the game appears in the public listing.
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Whether joining requires the game's join secret.
    pub fn is_protected(&self) -> bool {
        self.join_secret.is_some()
    }

    /// Debug scope covering this game.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// True until the first [`Game::close`].
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Store configuration data surfaced by `GET /api/games/{id}`.
    pub fn set_config(&self, value: serde_json::Value) {
        *self.game_config.write().expect("config lock") = Some(value);
    }

    pub fn config_value(&self) -> Option<serde_json::Value> {
        self.game_config.read().expect("config lock").clone()
    }

    pub fn on_player_joined(&self, hook: impl Fn(&Arc<Player>) + Send + Sync + 'static) {
        self.hooks.write().expect("hooks lock").player_joined = Some(Box::new(hook));
    }

    pub fn on_player_left(&self, hook: impl Fn(&Arc<Player>) + Send + Sync + 'static) {
        self.hooks.write().expect("hooks lock").player_left = Some(Box::new(hook));
    }

    pub fn on_player_socket_connected(
        &self,
        hook: impl Fn(&Arc<Player>, &Arc<GameSocket>) + Send + Sync + 'static,
    ) {
        self.hooks.write().expect("hooks lock").player_socket_connected = Some(Box::new(hook));
    }

    pub fn on_spectator_connected(
        &self,
        hook: impl Fn(&Arc<GameSocket>) + Send + Sync + 'static,
    ) {
        self.hooks.write().expect("hooks lock").spectator_connected = Some(Box::new(hook));
    }

    /// Look up a player by ID.
    pub async fn player(&self, id: Uuid) -> Option<Arc<Player>> {
        self.players.read().await.get(&id).cloned()
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    /// Snapshot of player IDs mapped to usernames, in join order.
    pub async fn username_map(&self) -> IndexMap<Uuid, String> {
        self.players
            .read()
            .await
            .iter()
            .map(|(id, player)| (*id, player.username().to_owned()))
            .collect()
    }

    /// Broadcast one event to every player and spectator.
    ///
    /// Each player fans the frame out to its own sockets or buffers it while
    /// it has none.
    pub async fn send<T: Serialize + ?Sized>(&self, name: &str, payload: &T) -> Result<(), Error> {
        let event = Event::new(name, payload)?;
        self.log.log_with(
            Severity::Trace,
            &event,
            format!("Broadcasting '{name}' event to all players..."),
        );
        let frame = event.encode()?;

        {
            let players = self.players.read().await;
            for player in players.values() {
                player.send_encoded(&frame).await;
            }
        }

        let spectators = self.spectators.read().await;
        for spectator in spectators.values() {
            let _ = spectator.send_frame(&frame);
        }

        Ok(())
    }

    /// Admit a new player, returning its ID and freshly generated secret.
    pub(crate) async fn join(
        self: &Arc<Self>,
        username: &str,
        join_secret: &str,
    ) -> Result<(Uuid, String), Error> {
        if !self.running() {
            return Err(Error::GameClosed);
        }
        if let Some(expected) = &self.join_secret {
            if !secrets_match(expected, join_secret) {
                return Err(Error::WrongJoinSecret);
            }
        }

        let player = {
            let mut players = self.players.write().await;
            let cap = self.config.max_players_per_game;
            if cap > 0 && players.len() >= cap {
                return Err(Error::MaxPlayersReached);
            }
            let player = Player::new(
                username.to_owned(),
                super::server::generate_secret(),
                Arc::downgrade(self),
                Arc::clone(&self.config),
            );
            players.insert(player.id(), Arc::clone(&player));
            player
        };
        *self.marked_empty_at.lock().expect("empty-stamp lock") = None;

        self.log
            .info(format!("Player '{username}' ({}) joined the game.", player.id()));

        if let Some(hook) = &self.hooks.read().expect("hooks lock").player_joined {
            hook(&player);
        }
        let _ = self
            .send(
                standard::EVENT_NEW_PLAYER,
                &standard::NewPlayerData {
                    username: username.to_owned(),
                },
            )
            .await;

        Ok((player.id(), player.secret().to_owned()))
    }

    /// Remove a player, disconnecting all of its sockets.
    pub(crate) async fn leave(&self, player: &Arc<Player>) {
        if !self.players.read().await.contains_key(&player.id()) {
            return;
        }

        if self.running() {
            if let Some(hook) = &self.hooks.read().expect("hooks lock").player_left {
                hook(player);
            }
        }

        let remaining = {
            let mut players = self.players.write().await;
            if players.shift_remove(&player.id()).is_none() {
                return;
            }
            players.len()
        };

        player.clear_game();
        player.disconnect_all().await;
        player.log().close();

        self.log.info(format!(
            "Player '{}' ({}) left the game.",
            player.username(),
            player.id()
        ));
        let _ = self.send(standard::EVENT_LEFT, &standard::LeftData {}).await;

        if remaining == 0 {
            *self.marked_empty_at.lock().expect("empty-stamp lock") = Some(Instant::now());
        }
    }

    /// Register a read-only spectator socket.
    pub(crate) async fn add_spectator(&self, socket: Arc<GameSocket>) -> Result<(), Error> {
        {
            let mut spectators = self.spectators.write().await;
            let cap = self.config.max_spectators_per_game;
            if cap > 0 && spectators.len() >= cap {
                return Err(Error::MaxSpectatorsReached);
            }
            spectators.insert(socket.id(), Arc::clone(&socket));
        }

        if let Some(hook) = &self.hooks.read().expect("hooks lock").spectator_connected {
            hook(&socket);
        }
        Ok(())
    }

    /// Forget a spectator socket. No-op for unknown IDs.
    pub(crate) async fn remove_spectator(&self, id: Uuid) {
        self.spectators.write().await.remove(&id);
    }

    pub(crate) fn notify_player_socket_connected(
        &self,
        player: &Arc<Player>,
        socket: &Arc<GameSocket>,
    ) {
        if let Some(hook) = &self.hooks.read().expect("hooks lock").player_socket_connected {
            hook(player, socket);
        }
    }

    /// Push a command onto the bounded queue, awaiting a slot when full.
    pub(crate) async fn enqueue_command(&self, wrapper: CommandWrapper) -> Result<(), Error> {
        let sender = self
            .commands_tx
            .lock()
            .expect("command queue lock")
            .clone()
            .ok_or(Error::GameClosed)?;
        sender.send(wrapper).await.map_err(|_| Error::GameClosed)
    }

    /// Pop the next pending command without waiting.
    pub async fn next_command(&self) -> Option<CommandWrapper> {
        self.commands_rx.lock().await.try_recv().ok()
    }

    /// Wait for the next command; `None` means the queue is drained and the
    /// game has been closed.
    pub async fn wait_next_command(&self) -> Option<CommandWrapper> {
        self.commands_rx.lock().await.recv().await
    }

    /// Stamp of the moment the game last became empty, if it still is.
    pub(crate) fn marked_empty_at(&self) -> Option<Instant> {
        *self.marked_empty_at.lock().expect("empty-stamp lock")
    }

    /// Stop the game: deregister it, remove every player, and close the
    /// command queue and logger. Idempotent.
    pub async fn close(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(server) = self.server.upgrade() {
                server.deregister_game(self.id).await;
                server.log().info(format!("Removed game {}.", self.id));
            }

            let players: Vec<Arc<Player>> =
                self.players.read().await.values().cloned().collect();
            for player in players {
                self.leave(&player).await;
            }

            self.commands_tx.lock().expect("command queue lock").take();
            self.log.close();
        }
    }

    /// Kick every player that has been without sockets for longer than the
    /// configured delay.
    pub(crate) async fn kick_inactive_players(&self) {
        let delay = self.config.kick_inactive_player_delay;
        if delay.is_zero() {
            return;
        }

        let players: Vec<Arc<Player>> = self.players.read().await.values().cloned().collect();
        for player in players {
            if player.socket_count().await == 0 && player.last_connection().elapsed() >= delay {
                self.leave(&player).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::envelope::Command;
    use axum::extract::ws::Message;

    fn game_with(config: ServerConfig, join_secret: Option<&str>) -> Arc<Game> {
        Game::new(
            Weak::new(),
            Arc::new(config),
            true,
            join_secret.map(str::to_owned),
        )
    }

    fn game() -> Arc<Game> {
        game_with(ServerConfig::default(), None)
    }

    async fn submit(game: &Arc<Game>, player: &Arc<Player>, name: &str) {
        game.enqueue_command(CommandWrapper {
            player: Arc::clone(player),
            command: Command::decode(&format!(r#"{{"name":"{name}"}}"#)).unwrap(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn join_rejects_wrong_secret_without_creating_a_player() {
        let game = game_with(ServerConfig::default(), Some("sesame"));
        assert!(matches!(
            game.join("bob", "wrong").await,
            Err(Error::WrongJoinSecret)
        ));
        assert_eq!(game.player_count().await, 0);

        let (id, secret) = game.join("bob", "sesame").await.unwrap();
        assert_eq!(secret.len(), 64);
        assert_eq!(game.player(id).await.unwrap().username(), "bob");
    }

    #[tokio::test]
    async fn join_enforces_the_player_cap() {
        let config = ServerConfig {
            max_players_per_game: 1,
            ..ServerConfig::default()
        };
        let game = game_with(config, None);
        game.join("alice", "").await.unwrap();
        assert!(matches!(
            game.join("bob", "").await,
            Err(Error::MaxPlayersReached)
        ));
    }

    #[tokio::test]
    async fn empty_stamp_is_set_iff_the_game_has_no_players() {
        let game = game();
        assert!(game.marked_empty_at().is_some());

        let (id, _) = game.join("alice", "").await.unwrap();
        assert!(game.marked_empty_at().is_none());

        let player = game.player(id).await.unwrap();
        game.leave(&player).await;
        assert!(game.marked_empty_at().is_some());

        game.join("bob", "").await.unwrap();
        assert!(game.marked_empty_at().is_none());
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_fires_the_hook_once() {
        let game = game();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hook_hits = Arc::clone(&hits);
        game.on_player_left(move |_| {
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });

        let (id, _) = game.join("alice", "").await.unwrap();
        let player = game.player(id).await.unwrap();
        game.leave(&player).await;
        game.leave(&player).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(game.player_count().await, 0);
    }

    #[tokio::test]
    async fn commands_are_consumed_in_enqueue_order() {
        let game = game();
        let (id, _) = game.join("alice", "").await.unwrap();
        let player = game.player(id).await.unwrap();

        submit(&game, &player, "first").await;
        submit(&game, &player, "second").await;

        assert_eq!(game.next_command().await.unwrap().command.name, "first");
        assert_eq!(game.wait_next_command().await.unwrap().command.name, "second");
        assert!(game.next_command().await.is_none());
    }

    #[tokio::test]
    async fn close_releases_waiting_consumers() {
        let game = game();
        let waiter = {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.wait_next_command().await })
        };

        tokio::task::yield_now().await;
        game.close().await;
        assert!(waiter.await.unwrap().is_none());
        assert!(!game.running());

        // Second close is a no-op.
        game.close().await;
    }

    #[tokio::test]
    async fn close_removes_players_without_firing_left_hooks() {
        let game = game();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hook_hits = Arc::clone(&hits);
        game.on_player_left(move |_| {
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });

        game.join("alice", "").await.unwrap();
        game.close().await;

        assert_eq!(game.player_count().await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_after_close_reports_the_closed_game() {
        let game = game();
        let (id, _) = game.join("alice", "").await.unwrap();
        let player = game.player(id).await.unwrap();
        game.close().await;

        let command = Command::decode(r#"{"name":"late"}"#).unwrap();
        assert!(matches!(
            player.submit(command).await,
            Err(Error::PlayerDetached)
        ));
        assert!(matches!(game.join("bob", "").await, Err(Error::GameClosed)));
    }

    #[tokio::test]
    async fn spectators_receive_broadcasts_and_respect_the_cap() {
        let config = ServerConfig {
            max_spectators_per_game: 1,
            ..ServerConfig::default()
        };
        let game = game_with(config, None);

        let (spectator, mut channels) = GameSocket::channel();
        game.add_spectator(spectator).await.unwrap();

        let (second, _second_channels) = GameSocket::channel();
        assert!(matches!(
            game.add_spectator(second).await,
            Err(Error::MaxSpectatorsReached)
        ));

        game.send("round_started", &7).await.unwrap();
        match channels.outbound.recv().await.unwrap() {
            Message::Text(text) => {
                assert_eq!(text.as_str(), r#"{"name":"round_started","data":7}"#);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcasts_are_buffered_for_socketless_players() {
        let game = game();
        let (id, _) = game.join("alice", "").await.unwrap();
        let player = game.player(id).await.unwrap();

        game.send("round_started", &1).await.unwrap();

        let (socket, mut channels) = GameSocket::channel();
        player.attach(socket).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(Message::Text(text)) = channels.outbound.try_recv() {
            seen.push(text.to_string());
        }
        // The join broadcast and the round event replay in order.
        assert_eq!(
            seen,
            vec![
                r#"{"name":"cg_new_player","data":{"username":"alice"}}"#,
                r#"{"name":"round_started","data":1}"#,
            ]
        );
    }
}
