//! Server configuration supplied by the game author at construction time.

use std::{path::PathBuf, time::Duration};

/// Read/write deadline applied to upgraded links when none is configured.
const DEFAULT_WEBSOCKET_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// TCP port the HTTP listener binds when none is configured.
const DEFAULT_PORT: u16 = 80;

/// Immutable runtime configuration shared across the whole server.
///
/// Counters set to `0` mean "unlimited"; delays set to zero disable the
/// corresponding reaper behavior.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port for the HTTP listener.
    pub port: u16,
    /// Path to the event-schema file served verbatim at `/api/events`.
    pub events_path: Option<PathBuf>,
    /// Path to the logo file served at `/api/logo`.
    pub logo_path: Option<PathBuf>,
    /// Directory mounted at `/`; unknown paths fall back to `index.html`.
    pub web_root: Option<PathBuf>,
    /// Maximum number of simultaneously attached sockets per player.
    pub max_sockets_per_player: usize,
    /// Maximum number of players per game.
    pub max_players_per_game: usize,
    /// Maximum number of spectators per game.
    pub max_spectators_per_game: usize,
    /// Maximum number of concurrently live games.
    pub max_games: usize,
    /// How long a game may stay empty before the reaper closes it.
    pub delete_inactive_game_delay: Duration,
    /// How long a player may stay without sockets before the reaper kicks it.
    pub kick_inactive_player_delay: Duration,
    /// Read/write deadline on upgraded links.
    pub websocket_timeout: Duration,
    /// Machine-readable server name surfaced by `/api/info`.
    pub name: String,
    /// Human-readable server name surfaced by `/api/info`.
    pub display_name: Option<String>,
    /// Game version surfaced by `/api/info`.
    pub version: Option<String>,
    /// Short description surfaced by `/api/info`.
    pub description: Option<String>,
    /// Source repository surfaced by `/api/info`.
    pub repository_url: Option<String>,
    /// Mirror debug records of the server-scope logger to the process console.
    pub print_debug_to_console: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            events_path: None,
            logo_path: None,
            web_root: None,
            max_sockets_per_player: 0,
            max_players_per_game: 0,
            max_spectators_per_game: 0,
            max_games: 0,
            delete_inactive_game_delay: Duration::ZERO,
            kick_inactive_player_delay: Duration::ZERO,
            websocket_timeout: DEFAULT_WEBSOCKET_TIMEOUT,
            name: String::new(),
            display_name: None,
            version: None,
            description: None,
            repository_url: None,
            print_debug_to_console: true,
        }
    }
}

impl ServerConfig {
    /// Replace zero values that have no sensible meaning with their defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.websocket_timeout.is_zero() {
            self.websocket_timeout = DEFAULT_WEBSOCKET_TIMEOUT;
        }
        self
    }

    /// Period of the inactivity reaper: the smallest nonzero delay, if any.
    pub(crate) fn reaper_period(&self) -> Option<Duration> {
        [
            self.kick_inactive_player_delay,
            self.delete_inactive_game_delay,
        ]
        .into_iter()
        .filter(|delay| !delay.is_zero())
        .min()
    }
}
