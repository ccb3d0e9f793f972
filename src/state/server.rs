//! The process-wide registry of live games.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use futures::future::BoxFuture;
use rand::{Rng, TryRngCore, distr::Alphanumeric, rngs::OsRng};
use subtle::ConstantTimeEq;
use tokio::{
    net::TcpListener,
    sync::RwLock,
    task::JoinHandle,
    time::{Instant, interval_at},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    error::Error,
    routes,
    state::{game::Game, logger::Logger},
};

/// Protocol version reported under `cg_version` by `/api/info`.
pub const PROTOCOL_VERSION: &str = "0.3";

/// Length of join and player secrets.
const SECRET_LENGTH: usize = 64;

pub type SharedServer = Arc<Server>;

type GameLogic =
    Box<dyn Fn(Arc<Game>, Option<serde_json::Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Hosts the HTTP listener, owns every live [`Game`], and runs the
/// inactivity reaper.
pub struct Server {
    config: Arc<ServerConfig>,
    log: Logger,
    games: RwLock<HashMap<Uuid, Arc<Game>>>,
    logic: GameLogic,
}

impl Server {
    /// Build a server around the author's game logic.
    ///
    /// The logic future is spawned once per created game; the game is closed
    /// as soon as it returns. Must be called from within a Tokio runtime.
    pub fn new<L, Fut>(config: ServerConfig, logic: L) -> SharedServer
    where
        L: Fn(Arc<Game>, Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let config = config.normalized();
        if config.events_path.is_none() {
            warn!("no event-schema file configured; /api/events will return 404");
        }

        Arc::new(Self {
            log: Logger::new(config.print_debug_to_console),
            config: Arc::new(config),
            games: RwLock::new(HashMap::new()),
            logic: Box::new(move |game, game_config| -> BoxFuture<'static, ()> {
                Box::pin(logic(game, game_config))
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub(crate) fn config_handle(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }

    /// Debug scope covering the whole server.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Create and register a game, then launch its game-logic task.
    ///
    /// Returns the game ID and, for protected games, the generated join
    /// secret.
    pub async fn create_game(
        self: &Arc<Self>,
        public: bool,
        protected: bool,
        game_config: Option<serde_json::Value>,
    ) -> Result<(Uuid, Option<String>), Error> {
        let join_secret = protected.then(generate_secret);

        let game = {
            let mut games = self.games.write().await;
            if self.config.max_games > 0 && games.len() >= self.config.max_games {
                return Err(Error::MaxGamesReached);
            }
            let game = Game::new(
                Arc::downgrade(self),
                self.config_handle(),
                public,
                join_secret.clone(),
            );
            games.insert(game.id(), Arc::clone(&game));
            game
        };

        self.log.info(format!("Created game {}.", game.id()));

        let logic = (self.logic)(Arc::clone(&game), game_config);
        let game_id = game.id();
        tokio::spawn(async move {
            logic.await;
            game.close().await;
        });

        Ok((game_id, join_secret))
    }

    /// Look up a game by ID.
    pub async fn game(&self, id: Uuid) -> Option<Arc<Game>> {
        self.games.read().await.get(&id).cloned()
    }

    pub(crate) async fn games_snapshot(&self) -> Vec<Arc<Game>> {
        self.games.read().await.values().cloned().collect()
    }

    /// Close a game and drop it from the registry. No-op for unknown IDs.
    pub async fn remove_game(&self, id: Uuid) {
        if let Some(game) = self.game(id).await {
            game.close().await;
        }
    }

    /// Drop a closing game from the registry without touching its state.
    pub(crate) async fn deregister_game(&self, id: Uuid) {
        self.games.write().await.remove(&id);
    }

    /// One reaper pass: kick socketless players past the kick delay, then
    /// close games that have been empty past the delete delay.
    pub(crate) async fn reap(&self) {
        let delete_delay = self.config.delete_inactive_game_delay;
        for game in self.games_snapshot().await {
            game.kick_inactive_players().await;

            if delete_delay.is_zero() || game.player_count().await > 0 {
                continue;
            }
            if let Some(stamp) = game.marked_empty_at() {
                if stamp.elapsed() >= delete_delay {
                    game.close().await;
                }
            }
        }
    }

    /// Start the periodic reaper, if any delay is configured.
    pub(crate) fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.config.reaper_period()?;
        let server = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                server.reap().await;
            }
        }))
    }

    /// The full HTTP surface, for embedding into an existing listener.
    pub fn router(self: &Arc<Self>) -> axum::Router {
        routes::router(Arc::clone(self))
    }

    /// Bind the configured port and serve until the process is told to stop.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let reaper = self.spawn_reaper();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "listening");

        let app = self.router();
        let result = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        result.map_err(Error::Io)
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// 64 characters of `[0-9A-Za-z]` from the OS entropy source.
///
/// Entropy failure panics: there is no safe fallback for secrets.
pub(crate) fn generate_secret() -> String {
    let mut rng = OsRng.unwrap_err();
    (0..SECRET_LENGTH)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Constant-time secret comparison.
pub(crate) fn secrets_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server_with(config: ServerConfig) -> SharedServer {
        // Game logic that drains commands until its game closes.
        Server::new(config, |game, _config| async move {
            while game.wait_next_command().await.is_some() {}
        })
    }

    #[test]
    fn secrets_use_the_full_alphanumeric_alphabet() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn secret_comparison_accepts_only_exact_matches() {
        assert!(secrets_match("abc123", "abc123"));
        assert!(!secrets_match("abc123", "abc124"));
        assert!(!secrets_match("abc123", "abc12"));
        assert!(!secrets_match("abc123", ""));
    }

    #[tokio::test]
    async fn create_game_enforces_the_cap() {
        let server = server_with(ServerConfig {
            max_games: 1,
            ..ServerConfig::default()
        });

        let (id, join_secret) = server.create_game(true, false, None).await.unwrap();
        assert!(join_secret.is_none());
        assert!(server.game(id).await.is_some());

        assert!(matches!(
            server.create_game(true, false, None).await,
            Err(Error::MaxGamesReached)
        ));
    }

    #[tokio::test]
    async fn protected_games_get_a_join_secret() {
        let server = server_with(ServerConfig::default());
        let (_, join_secret) = server.create_game(false, true, None).await.unwrap();
        assert_eq!(join_secret.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn remove_game_is_idempotent() {
        let server = server_with(ServerConfig::default());
        let (id, _) = server.create_game(true, false, None).await.unwrap();

        server.remove_game(id).await;
        assert!(server.game(id).await.is_none());
        server.remove_game(id).await;
    }

    #[tokio::test]
    async fn returning_game_logic_closes_the_game() {
        let server = Server::new(ServerConfig::default(), |_game, _config| async {});
        let (id, _) = server.create_game(true, false, None).await.unwrap();

        for _ in 0..64 {
            if server.game(id).await.is_none() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("game was not closed after its logic returned");
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_kicks_inactive_players_and_closes_empty_games() {
        let server = server_with(ServerConfig {
            kick_inactive_player_delay: Duration::from_secs(1),
            delete_inactive_game_delay: Duration::from_secs(2),
            ..ServerConfig::default()
        });

        let (game_id, _) = server.create_game(true, false, None).await.unwrap();
        let game = server.game(game_id).await.unwrap();
        game.join("alice", "").await.unwrap();

        // Not yet past the kick delay.
        tokio::time::advance(Duration::from_millis(900)).await;
        server.reap().await;
        assert_eq!(game.player_count().await, 1);

        // Past the kick delay: the socketless player is removed.
        tokio::time::advance(Duration::from_millis(200)).await;
        server.reap().await;
        assert_eq!(game.player_count().await, 0);
        assert!(game.marked_empty_at().is_some());

        // Past the delete delay: the empty game is closed and deregistered.
        tokio::time::advance(Duration::from_millis(2100)).await;
        server.reap().await;
        assert!(!game.running());
        assert!(server.game(game_id).await.is_none());
    }
}
