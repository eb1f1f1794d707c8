//! Match pool - registry of live games

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;

use super::events::GameEvent;
use super::r#match::{Game, GameState};
use super::scheduler::GameScheduler;

/// Handle to a live match
#[derive(Clone)]
pub struct GameHandle {
    pub id: Uuid,
    pub game: Arc<Mutex<Game>>,
    pub scheduler: Arc<GameScheduler>,
}

impl GameHandle {
    pub fn state(&self) -> GameState {
        self.game.lock().state()
    }

    pub fn player_count(&self) -> usize {
        self.game.lock().player_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.game.lock().subscribe()
    }
}

/// Registry of all active matches.
///
/// Owns match creation (game + arena + scheduler wiring) and reclaims
/// concluded matches; the binary sweeps [`Self::reclaim`] periodically.
pub struct GameRegistry {
    games: DashMap<Uuid, GameHandle>,
    config: Config,
}

impl GameRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            games: DashMap::new(),
            config,
        }
    }

    /// Create a match, wire its arena and scheduler, and start driving it
    pub fn create_game(&self) -> GameHandle {
        let id = Uuid::new_v4();
        let seed = rand::random::<u64>();

        let mut game = Game::new(id, seed, &self.config);
        game.attach_arena(
            self.config.arena_world.clone(),
            self.config.arena_center,
            self.config.zone_initial_radius,
            self.config.zone_phases(),
        );

        let game = Arc::new(Mutex::new(game));
        let scheduler = Arc::new(GameScheduler::new(Arc::clone(&game), &self.config));
        scheduler.start();

        let handle = GameHandle {
            id,
            game,
            scheduler,
        };
        self.games.insert(id, handle.clone());

        info!(match_id = %id, "Created new match");
        handle
    }

    pub fn get(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.get(id).map(|h| h.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<GameHandle> {
        self.games.remove(id).map(|(_, h)| h)
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn total_players(&self) -> usize {
        self.games.iter().map(|h| h.value().player_count()).sum()
    }

    /// Find a lobby with an open slot
    pub fn find_available_game(&self) -> Option<GameHandle> {
        self.games
            .iter()
            .find(|h| {
                h.value().state() == GameState::Waiting
                    && h.value().player_count() < self.config.max_players
            })
            .map(|h| h.value().clone())
    }

    /// Remove every concluded match from the pool, stopping any scheduler
    /// remnants. Returns how many matches were reclaimed.
    pub fn reclaim(&self) -> usize {
        let ended: Vec<Uuid> = self
            .games
            .iter()
            .filter(|h| h.value().state() == GameState::Ending)
            .map(|h| h.id)
            .collect();

        for id in &ended {
            if let Some((_, handle)) = self.games.remove(id) {
                handle.scheduler.stop();
                info!(match_id = %id, "Match removed from registry");
            }
        }
        ended.len()
    }
}
