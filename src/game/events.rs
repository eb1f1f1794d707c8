//! Broadcast event definitions
//! These are the types the hosting layer observes to drive presentation,
//! damage application, and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::r#match::GameState;

/// Events broadcast by a match as it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Player accepted into the roster
    PlayerJoined {
        user_id: Uuid,
        display_name: String,
        player_count: usize,
    },

    /// Player removed from the roster
    PlayerLeft { user_id: Uuid },

    /// Match state transition accepted
    StateChanged {
        from: GameState,
        to: GameState,
    },

    /// Lobby countdown progress (sent once per second while starting)
    CountdownTick { seconds_remaining: u32 },

    /// Match has started
    MatchStarted { started_at: u64 },

    /// Player eliminated; placement is final
    PlayerEliminated {
        user_id: Uuid,
        placement: u32,
        alive_remaining: usize,
    },

    /// Zone began shrinking towards a new target
    ZoneShrinkStarted {
        phase_id: u32,
        target_radius: f32,
        duration_secs: f32,
    },

    /// Zone reached its target radius
    ZoneShrinkCompleted { radius: f32 },

    /// Deathmatch finale forced
    DeathmatchStarted,

    /// Periodic observability snapshot while the match is live
    Heartbeat {
        state: GameState,
        alive: usize,
        zone_radius: f32,
        shrink_progress: f32,
    },

    /// Match concluded; summary is the persistence payload
    MatchEnded { summary: MatchSummary },
}

/// Final placement for one roster member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub user_id: Uuid,
    pub display_name: String,
    /// 1 = winner
    pub placement: u32,
}

/// End-of-match report handed to the persistence sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub winner_user_id: Option<Uuid>,
    pub duration_secs: u32,
    pub ended_at: DateTime<Utc>,
    pub placements: Vec<PlacementRecord>,
}
