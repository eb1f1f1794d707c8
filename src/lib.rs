//! Match orchestration core for the battle royale game mode.
//!
//! The library exposes the pieces the hosting layer wires together:
//! - [`game::Game`] — the per-match aggregate and state machine
//! - [`game::GameScheduler`] — the timing authority driving a match
//! - [`game::Zone`] — the shrinking play area
//! - [`loot::LootTable`] — weighted-random loot generation
//! - [`game::GameRegistry`] — the pool of live matches

pub mod config;
pub mod game;
pub mod loot;
pub mod util;
