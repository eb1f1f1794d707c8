//! Match aggregate and authoritative state machine

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::loot::{LootDrop, LootTable, LootTier};
use crate::util::time::unix_millis;

use super::events::{GameEvent, MatchSummary, PlacementRecord};
use super::zone::{Position, Zone, ZonePhase};

/// Damage metadata for the forced deathmatch collapse
const DEATHMATCH_DAMAGE_PER_TICK: f32 = 5.0;
const DEATHMATCH_TICK_INTERVAL_SECS: f32 = 0.5;

/// Match lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    /// Accepting joins
    Waiting,
    /// Countdown armed, joins rejected
    Starting,
    /// Match in progress
    Active,
    /// Forced finale after the match duration elapses
    Deathmatch,
    /// Terminal; winner and placements frozen
    Ending,
}

impl GameState {
    /// The transition table. Forward-only, with one sanctioned revert:
    /// Starting falls back to Waiting when the roster drops below the
    /// minimum before the countdown completes.
    pub const fn legal_next(self) -> &'static [GameState] {
        match self {
            Self::Waiting => &[Self::Starting],
            Self::Starting => &[Self::Waiting, Self::Active],
            Self::Active => &[Self::Deathmatch, Self::Ending],
            Self::Deathmatch => &[Self::Ending],
            Self::Ending => &[],
        }
    }

    pub fn can_transition_to(self, next: GameState) -> bool {
        self.legal_next().contains(&next)
    }
}

/// Roster record for one player
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    pub display_name: String,
    pub alive: bool,
    /// Final ranking, 1 = winner; assigned exactly once
    pub placement: Option<u32>,
    pub joined_at: u64,
    /// Join order, used for deterministic summary ordering
    pub join_seq: u32,
}

/// One battle-royale match from lobby to conclusion.
///
/// The aggregate root: owns the roster, the zone, the loot table, and the
/// per-match RNG. All mutation funnels through the methods here; callers
/// from other execution contexts serialize on the mutex the scheduler
/// shares. Every accepted state transition is published on the watch
/// channel (for the scheduler) and the event bus (for the hosting layer).
pub struct Game {
    id: Uuid,
    min_players: usize,
    max_players: usize,
    match_duration_secs: f32,
    deathmatch_phase: ZonePhase,

    roster: HashMap<Uuid, PlayerEntry>,
    join_counter: u32,
    state: GameState,
    alive_count: usize,
    started_at: Option<u64>,
    ended_at: Option<u64>,
    winner: Option<Uuid>,

    zone: Option<Zone>,
    loot: LootTable,
    rng: ChaCha8Rng,

    state_tx: watch::Sender<GameState>,
    events: broadcast::Sender<GameEvent>,
}

impl Game {
    pub fn new(id: Uuid, seed: u64, config: &Config) -> Self {
        let (state_tx, _) = watch::channel(GameState::Waiting);
        let (events, _) = broadcast::channel(64);

        Self {
            id,
            min_players: config.min_players,
            max_players: config.max_players,
            match_duration_secs: config.match_duration_secs,
            deathmatch_phase: ZonePhase {
                id: u32::MAX,
                wait_secs: 0.0,
                shrink_secs: config.deathmatch_shrink_secs,
                target_radius: config.deathmatch_radius,
                damage_per_tick: DEATHMATCH_DAMAGE_PER_TICK,
                tick_interval_secs: DEATHMATCH_TICK_INTERVAL_SECS,
            },
            roster: HashMap::new(),
            join_counter: 0,
            state: GameState::Waiting,
            alive_count: 0,
            started_at: None,
            ended_at: None,
            winner: None,
            zone: None,
            loot: LootTable::default_table(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            state_tx,
            events,
        }
    }

    /// Create the owned zone for this match's arena
    pub fn attach_arena(
        &mut self,
        world: impl Into<String>,
        center: Position,
        initial_radius: f32,
        phases: Vec<ZonePhase>,
    ) {
        self.zone = Some(Zone::new(world, center, initial_radius, phases));
    }

    /// Accept a player into the roster.
    ///
    /// Rejected (no-op, returns false) outside WAITING, at capacity, or
    /// for a duplicate id. Reaching the configured minimum arms the
    /// countdown via WAITING -> STARTING.
    pub fn add_player(&mut self, user_id: Uuid, display_name: impl Into<String>) -> bool {
        if self.state != GameState::Waiting {
            debug!(match_id = %self.id, %user_id, state = ?self.state, "Join rejected: not waiting");
            return false;
        }
        if self.roster.len() >= self.max_players {
            debug!(match_id = %self.id, %user_id, "Join rejected: match full");
            return false;
        }
        if self.roster.contains_key(&user_id) {
            warn!(match_id = %self.id, %user_id, "Join rejected: already in match");
            return false;
        }

        let display_name = display_name.into();
        self.roster.insert(
            user_id,
            PlayerEntry {
                display_name: display_name.clone(),
                alive: true,
                placement: None,
                joined_at: unix_millis(),
                join_seq: self.join_counter,
            },
        );
        self.join_counter += 1;
        self.alive_count += 1;

        info!(
            match_id = %self.id,
            %user_id,
            player_count = self.roster.len(),
            "Player joined match"
        );
        self.emit(GameEvent::PlayerJoined {
            user_id,
            display_name,
            player_count: self.roster.len(),
        });

        if self.roster.len() >= self.min_players {
            self.set_state(GameState::Starting);
        }
        true
    }

    /// Remove a player from the roster in any state.
    ///
    /// A STARTING roster dropping below the minimum reverts to WAITING;
    /// a removal during play runs the same win-check as an elimination.
    pub fn remove_player(&mut self, user_id: Uuid) -> bool {
        let Some(entry) = self.roster.remove(&user_id) else {
            return false;
        };
        if entry.alive {
            self.alive_count = self.alive_count.saturating_sub(1);
        }

        info!(
            match_id = %self.id,
            %user_id,
            player_count = self.roster.len(),
            "Player left match"
        );
        self.emit(GameEvent::PlayerLeft { user_id });

        if self.state == GameState::Starting && self.roster.len() < self.min_players {
            self.set_state(GameState::Waiting);
        }
        if matches!(self.state, GameState::Active | GameState::Deathmatch) {
            self.check_win();
        }
        true
    }

    /// Eliminate a player, assigning the next placement number.
    ///
    /// Placements count down from the alive count, so the first player
    /// out of N placed N-th and the survivor places first. Rejected
    /// outside ACTIVE/DEATHMATCH and for players already out.
    pub fn eliminate_player(&mut self, user_id: Uuid) -> bool {
        if !matches!(self.state, GameState::Active | GameState::Deathmatch) {
            debug!(match_id = %self.id, %user_id, state = ?self.state, "Elimination rejected");
            return false;
        }
        let placement = self.alive_count as u32;
        let Some(entry) = self.roster.get_mut(&user_id) else {
            return false;
        };
        if !entry.alive {
            return false;
        }

        entry.alive = false;
        if entry.placement.is_some() {
            warn!(match_id = %self.id, %user_id, "Placement already assigned, keeping original");
        } else {
            entry.placement = Some(placement);
        }
        self.alive_count = self.alive_count.saturating_sub(1);
        self.reconcile_alive_count();

        info!(
            match_id = %self.id,
            %user_id,
            placement,
            alive = self.alive_count,
            "Player eliminated"
        );
        self.emit(GameEvent::PlayerEliminated {
            user_id,
            placement,
            alive_remaining: self.alive_count,
        });

        self.check_win();
        true
    }

    /// Win-condition poll, idempotent. Covers eliminations and removals:
    /// one survivor is crowned, zero survivors concludes with no winner.
    pub fn check_win(&mut self) {
        if !matches!(self.state, GameState::Active | GameState::Deathmatch) {
            return;
        }
        match self.alive_count {
            1 => {
                if let Some((id, entry)) =
                    self.roster.iter_mut().find(|(_, e)| e.alive)
                {
                    entry.placement = Some(1);
                    self.winner = Some(*id);
                    info!(match_id = %self.id, winner = %id, "Match won");
                }
                self.set_state(GameState::Ending);
            }
            0 => {
                warn!(match_id = %self.id, "All players eliminated, ending with no winner");
                self.set_state(GameState::Ending);
            }
            _ => {}
        }
    }

    /// Request a state transition; illegal requests are logged no-ops.
    pub fn set_state(&mut self, next: GameState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                match_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Rejected state transition"
            );
            return false;
        }

        let from = self.state;
        self.state = next;
        let now = unix_millis();

        match next {
            GameState::Active => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
                if let Some(zone) = self.zone.as_mut() {
                    zone.arm(now);
                }
                info!(match_id = %self.id, "Match started");
                self.emit(GameEvent::MatchStarted { started_at: now });
            }
            GameState::Deathmatch => {
                let phase = self.deathmatch_phase;
                if let Some(zone) = self.zone.as_mut() {
                    zone.force_phase(phase, now);
                }
                info!(match_id = %self.id, "Deathmatch started");
                self.emit(GameEvent::DeathmatchStarted);
            }
            GameState::Ending => {
                if self.ended_at.is_none() {
                    self.ended_at = Some(now);
                }
                info!(match_id = %self.id, winner = ?self.winner, "Match ended");
            }
            GameState::Waiting | GameState::Starting => {}
        }

        self.emit(GameEvent::StateChanged { from, to: next });
        if next == GameState::Ending {
            self.emit(GameEvent::MatchEnded {
                summary: self.summary(),
            });
        }
        let _ = self.state_tx.send_replace(next);
        true
    }

    /// True when the match has outlived its configured duration and the
    /// deathmatch finale should be forced. Polled by the scheduler so the
    /// decision lands on a tick boundary.
    pub fn should_trigger_deathmatch(&self, now_ms: u64) -> bool {
        self.state == GameState::Active
            && self
                .started_at
                .is_some_and(|start| now_ms.saturating_sub(start) as f32 / 1000.0
                    >= self.match_duration_secs)
    }

    /// End-of-match report for the persistence sink
    pub fn summary(&self) -> MatchSummary {
        let mut placements: Vec<PlacementRecord> = self
            .roster
            .iter()
            .filter_map(|(id, e)| {
                e.placement.map(|placement| PlacementRecord {
                    user_id: *id,
                    display_name: e.display_name.clone(),
                    placement,
                })
            })
            .collect();
        placements.sort_by_key(|p| p.placement);

        let duration_secs = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end.saturating_sub(start) / 1000) as u32,
            _ => 0,
        };

        MatchSummary {
            match_id: self.id,
            winner_user_id: self.winner,
            duration_secs,
            ended_at: chrono::Utc::now(),
            placements,
        }
    }

    /// Generate loot from this match's table with the match-seeded RNG
    pub fn generate_loot(&mut self, tier: LootTier, count: usize) -> Vec<LootDrop> {
        self.loot.generate_loot(tier, count, &mut self.rng)
    }

    /// Generate loot with a fresh tier selection per item
    pub fn generate_mixed_loot(&mut self, count: usize) -> Vec<LootDrop> {
        self.loot.generate_mixed_loot(count, &mut self.rng)
    }

    // Invariant: alive_count always equals the roster recount. A live
    // match must not crash on drift, so clamp and warn.
    fn reconcile_alive_count(&mut self) {
        let recount = self.roster.values().filter(|e| e.alive).count();
        if recount != self.alive_count {
            warn!(
                match_id = %self.id,
                maintained = self.alive_count,
                recount,
                "Alive count drifted, clamping to roster"
            );
            self.alive_count = recount;
        }
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    pub fn is_player_alive(&self, user_id: &Uuid) -> bool {
        self.roster.get(user_id).map(|e| e.alive).unwrap_or(false)
    }

    pub fn player(&self, user_id: &Uuid) -> Option<&PlayerEntry> {
        self.roster.get(user_id)
    }

    pub fn winner(&self) -> Option<Uuid> {
        self.winner
    }

    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<u64> {
        self.ended_at
    }

    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    pub fn zone_mut(&mut self) -> Option<&mut Zone> {
        self.zone.as_mut()
    }

    pub fn loot_mut(&mut self) -> &mut LootTable {
        &mut self.loot
    }

    /// Subscribe to the match event bus
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Sender handle for scheduler-originated events (countdown, heartbeat)
    pub fn event_sender(&self) -> broadcast::Sender<GameEvent> {
        self.events.clone()
    }

    /// Watch channel carrying every accepted state transition
    pub fn state_watch(&self) -> watch::Receiver<GameState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min: usize, max: usize) -> Config {
        Config {
            min_players: min,
            max_players: max,
            ..Config::default()
        }
    }

    fn game(min: usize, max: usize) -> Game {
        Game::new(Uuid::new_v4(), 7, &config(min, max))
    }

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn reaching_min_players_arms_the_countdown() {
        let mut g = game(2, 10);
        let p = ids(2);

        assert!(g.add_player(p[0], "alice"));
        assert_eq!(g.state(), GameState::Waiting);

        assert!(g.add_player(p[1], "bob"));
        assert_eq!(g.state(), GameState::Starting);
    }

    #[test]
    fn joins_rejected_after_waiting_and_at_capacity() {
        let mut g = game(3, 3);
        let p = ids(5);
        for id in &p[..3] {
            assert!(g.add_player(*id, "p"));
        }
        assert_eq!(g.state(), GameState::Starting);
        assert!(!g.add_player(p[3], "late"));

        let mut full = game(5, 3);
        for id in &p[..3] {
            assert!(full.add_player(*id, "p"));
        }
        assert!(!full.add_player(p[4], "overflow"));
        assert_eq!(full.player_count(), 3);
    }

    #[test]
    fn duplicate_join_is_a_no_op() {
        let mut g = game(5, 10);
        let id = Uuid::new_v4();
        assert!(g.add_player(id, "alice"));
        assert!(!g.add_player(id, "alice"));
        assert_eq!(g.player_count(), 1);
        assert_eq!(g.alive_count(), 1);
    }

    #[test]
    fn transition_table_rejects_backward_and_skipping_moves() {
        let mut g = game(2, 10);
        assert!(!g.set_state(GameState::Active));
        assert!(!g.set_state(GameState::Deathmatch));
        assert!(!g.set_state(GameState::Ending));
        assert_eq!(g.state(), GameState::Waiting);

        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        assert!(g.set_state(GameState::Active));
        assert!(!g.set_state(GameState::Starting));
        assert!(!g.set_state(GameState::Waiting));
        assert_eq!(g.state(), GameState::Active);

        assert!(g.set_state(GameState::Deathmatch));
        assert!(g.set_state(GameState::Ending));
        assert!(!g.set_state(GameState::Active));
        assert_eq!(g.state(), GameState::Ending);
    }

    #[test]
    fn starting_reverts_to_waiting_when_roster_shrinks() {
        let mut g = game(2, 10);
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        assert_eq!(g.state(), GameState::Starting);

        assert!(g.remove_player(p[1]));
        assert_eq!(g.state(), GameState::Waiting);

        // The lobby can re-arm after the revert.
        assert!(g.add_player(p[1], "b"));
        assert_eq!(g.state(), GameState::Starting);
    }

    #[test]
    fn active_records_started_at_exactly_once() {
        let mut g = game(2, 10);
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");

        assert!(g.started_at().is_none());
        g.set_state(GameState::Active);
        let started = g.started_at().expect("started_at set on ACTIVE");
        assert!(started > 0);
    }

    #[test]
    fn placements_form_a_permutation_with_winner_first() {
        let mut g = game(4, 10);
        let p = ids(4);
        for id in &p {
            g.add_player(*id, "p");
        }
        g.set_state(GameState::Active);

        assert!(g.eliminate_player(p[0]));
        assert!(g.eliminate_player(p[1]));
        assert!(g.eliminate_player(p[2]));

        assert_eq!(g.state(), GameState::Ending);
        assert_eq!(g.winner(), Some(p[3]));
        assert!(g.ended_at().is_some());

        let summary = g.summary();
        let placements: Vec<u32> = summary.placements.iter().map(|r| r.placement).collect();
        assert_eq!(placements, vec![1, 2, 3, 4]);
        assert_eq!(summary.placements[0].user_id, p[3]);
        assert_eq!(summary.winner_user_id, Some(p[3]));
    }

    #[test]
    fn eliminating_the_last_player_ends_with_no_winner() {
        let mut g = game(1, 10);
        let id = Uuid::new_v4();
        g.add_player(id, "solo");
        assert_eq!(g.state(), GameState::Starting);
        g.set_state(GameState::Active);

        assert!(g.eliminate_player(id));
        assert_eq!(g.state(), GameState::Ending);
        assert_eq!(g.winner(), None);
        assert_eq!(g.alive_count(), 0);
        assert_eq!(g.summary().placements[0].placement, 1);
    }

    #[test]
    fn elimination_outside_play_is_rejected() {
        let mut g = game(2, 10);
        let p = ids(2);
        g.add_player(p[0], "a");
        assert!(!g.eliminate_player(p[0]));

        g.add_player(p[1], "b");
        assert!(!g.eliminate_player(p[0]));
        assert!(g.is_player_alive(&p[0]));
    }

    #[test]
    fn double_elimination_is_a_no_op() {
        let mut g = game(3, 10);
        let p = ids(3);
        for id in &p {
            g.add_player(*id, "p");
        }
        g.set_state(GameState::Active);

        assert!(g.eliminate_player(p[0]));
        assert!(!g.eliminate_player(p[0]));
        assert_eq!(g.alive_count(), 2);
    }

    #[test]
    fn removal_during_play_runs_the_win_check() {
        let mut g = game(2, 10);
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        g.set_state(GameState::Active);

        assert!(g.remove_player(p[0]));
        assert_eq!(g.state(), GameState::Ending);
        assert_eq!(g.winner(), Some(p[1]));
    }

    #[test]
    fn removing_everyone_ends_with_no_winner() {
        let mut g = game(2, 10);
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        g.set_state(GameState::Active);

        g.remove_player(p[0]);
        // First removal already crowned the survivor and ended the match.
        assert_eq!(g.state(), GameState::Ending);

        let mut g = game(1, 10);
        let id = Uuid::new_v4();
        g.add_player(id, "solo");
        g.set_state(GameState::Active);
        g.remove_player(id);
        assert_eq!(g.state(), GameState::Ending);
        assert_eq!(g.winner(), None);
    }

    #[test]
    fn deathmatch_poll_respects_duration_and_state() {
        let mut g = Game::new(
            Uuid::new_v4(),
            7,
            &Config {
                min_players: 2,
                match_duration_secs: 600.0,
                ..Config::default()
            },
        );
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");

        assert!(!g.should_trigger_deathmatch(unix_millis()));
        g.set_state(GameState::Active);
        let start = g.started_at().unwrap();

        assert!(!g.should_trigger_deathmatch(start + 599_000));
        assert!(g.should_trigger_deathmatch(start + 600_000));

        g.set_state(GameState::Deathmatch);
        assert!(!g.should_trigger_deathmatch(start + 700_000));
    }

    #[test]
    fn entering_deathmatch_forces_the_zone_collapse() {
        let mut g = game(2, 10);
        g.attach_arena(
            "arena",
            Position::new(0.0, 0.0, 64.0),
            1000.0,
            ZonePhase::default_phases(),
        );
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        g.set_state(GameState::Active);
        g.set_state(GameState::Deathmatch);

        let zone = g.zone().unwrap();
        assert!(zone.is_shrinking());
        assert_eq!(zone.target_radius(), Config::default().deathmatch_radius);
    }

    #[test]
    fn lifecycle_events_reach_subscribers() {
        let mut g = game(2, 10);
        let mut rx = g.subscribe();
        let p = ids(2);
        g.add_player(p[0], "a");
        g.add_player(p[1], "b");
        g.set_state(GameState::Active);
        g.eliminate_player(p[0]);

        let mut saw_elimination = false;
        let mut saw_summary = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                GameEvent::PlayerEliminated { placement, .. } => {
                    assert_eq!(placement, 2);
                    saw_elimination = true;
                }
                GameEvent::MatchEnded { summary } => {
                    assert_eq!(summary.winner_user_id, Some(p[1]));
                    saw_summary = true;
                }
                _ => {}
            }
        }
        assert!(saw_elimination && saw_summary);
    }

    #[test]
    fn match_loot_is_deterministic_per_seed() {
        let cfg = config(2, 10);
        let id = Uuid::new_v4();
        let mut a = Game::new(id, 42, &cfg);
        let mut b = Game::new(id, 42, &cfg);
        assert_eq!(a.generate_mixed_loot(32), b.generate_mixed_loot(32));
        assert_eq!(
            a.generate_loot(LootTier::Epic, 8),
            b.generate_loot(LootTier::Epic, 8)
        );
    }
}
