//! Match scheduler - the single timing authority
//!
//! The scheduler owns every periodic task for one match and is the only
//! component that calls time-based mutators on the game and its zone.
//! Task handles live in an explicit [`TaskSet`] owned by the scheduler;
//! cancelling is aborting owned handles, never consulting a global
//! registry. The shared game sits behind a `parking_lot` mutex that is
//! only ever held across synchronous mutation, so eliminations arriving
//! from other execution contexts serialize with the tick.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::util::time::{unix_millis, COUNTDOWN_RESOLUTION_MS, HEARTBEAT_INTERVAL_MS};

use super::events::GameEvent;
use super::r#match::{Game, GameState};
use super::zone::ZoneEvent;

/// Owned handles for the periodic tasks of one scheduler.
///
/// Cancellation is idempotent: aborting an already-finished or
/// already-taken handle is a no-op.
#[derive(Default)]
struct TaskSet {
    countdown: Option<JoinHandle<()>>,
    tick: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl TaskSet {
    /// Cancel the tasks tied to the current state, leaving the state
    /// listener running.
    fn cancel_state_tasks(&mut self) {
        for handle in [
            self.countdown.take(),
            self.tick.take(),
            self.heartbeat.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_state_tasks();
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }

    fn active_count(&self) -> usize {
        [
            self.countdown.as_ref(),
            self.tick.as_ref(),
            self.heartbeat.as_ref(),
            self.listener.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|h| !h.is_finished())
        .count()
    }
}

/// Drives one match through its lifecycle.
///
/// Task sets per state:
/// - STARTING: one-second countdown
/// - ACTIVE / DEATHMATCH: simulation tick + heartbeat broadcast
/// - ENDING: nothing; everything is cancelled and the scheduler stops
pub struct GameScheduler {
    game: Arc<Mutex<Game>>,
    countdown_secs: u32,
    tick_interval_ms: u64,
    tasks: Mutex<TaskSet>,
    countdown: Arc<AtomicU32>,
    running: AtomicBool,
    events: broadcast::Sender<GameEvent>,
}

impl GameScheduler {
    pub fn new(game: Arc<Mutex<Game>>, config: &Config) -> Self {
        let events = game.lock().event_sender();
        Self {
            game,
            countdown_secs: config.countdown_secs,
            tick_interval_ms: config.tick_interval_ms,
            tasks: Mutex::new(TaskSet::default()),
            countdown: Arc::new(AtomicU32::new(config.countdown_secs)),
            running: AtomicBool::new(false),
            events,
        }
    }

    /// Begin driving the match from its current state.
    ///
    /// Arms a listener that funnels every accepted state transition into
    /// [`Self::on_state_change`], then starts the task set for the state
    /// the match is already in. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state_rx = self.game.lock().state_watch();
        let scheduler = Arc::clone(self);
        let listener = tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                scheduler.on_state_change(state);
            }
        });
        self.tasks.lock().listener = Some(listener);

        let state = self.game.lock().state();
        info!(state = ?state, "Scheduler started");
        self.apply_state(state);
    }

    /// Cancel every owned task. Idempotent; safe when never started.
    pub fn stop(&self) {
        self.tasks.lock().cancel_all();
        self.running.store(false, Ordering::SeqCst);
        debug!("Scheduler stopped");
    }

    /// Swap the running task set for the one matching the new state
    pub fn on_state_change(&self, state: GameState) {
        debug!(state = ?state, "Scheduler swapping task set");
        self.tasks.lock().cancel_state_tasks();
        self.apply_state(state);
    }

    /// Remaining lobby countdown; 0 outside STARTING
    pub fn get_countdown_seconds(&self) -> u32 {
        if self.game.lock().state() == GameState::Starting {
            self.countdown.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of owned tasks still alive; exposed so hosts and tests can
    /// assert that start/stop cycles leave no orphans.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().active_count()
    }

    fn apply_state(&self, state: GameState) {
        match state {
            GameState::Waiting => {
                self.countdown.store(self.countdown_secs, Ordering::Relaxed);
            }
            GameState::Starting => {
                self.countdown.store(self.countdown_secs, Ordering::Relaxed);
                self.tasks.lock().countdown = Some(self.spawn_countdown());
            }
            GameState::Active | GameState::Deathmatch => {
                let mut tasks = self.tasks.lock();
                tasks.tick = Some(self.spawn_tick());
                tasks.heartbeat = Some(self.spawn_heartbeat());
            }
            GameState::Ending => {
                self.tasks.lock().cancel_all();
                self.running.store(false, Ordering::SeqCst);
                info!("Match ended, scheduler wound down");
            }
        }
    }

    fn spawn_countdown(&self) -> JoinHandle<()> {
        let game = Arc::clone(&self.game);
        let countdown = Arc::clone(&self.countdown);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(COUNTDOWN_RESOLUTION_MS));
            loop {
                ticker.tick().await;
                let remaining = countdown.load(Ordering::Relaxed);
                if remaining == 0 {
                    let mut game = game.lock();
                    if game.state() == GameState::Starting {
                        game.set_state(GameState::Active);
                    }
                    break;
                }
                let _ = events.send(GameEvent::CountdownTick {
                    seconds_remaining: remaining,
                });
                countdown.store(remaining - 1, Ordering::Relaxed);
            }
        })
    }

    /// The simulation tick. In-tick order is fixed: zone advance, then
    /// win-check, then deathmatch-trigger check, so a shrink completing
    /// and a win condition arising in the same tick are both observed in
    /// that tick.
    fn spawn_tick(&self) -> JoinHandle<()> {
        let game = Arc::clone(&self.game);
        let events = self.events.clone();
        let tick_interval_ms = self.tick_interval_ms;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(tick_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = unix_millis();

                let mut game = game.lock();
                if let Some(zone) = game.zone_mut() {
                    for event in zone.tick(now) {
                        let _ = events.send(match event {
                            ZoneEvent::ShrinkStarted {
                                phase_id,
                                target_radius,
                                duration_secs,
                            } => GameEvent::ZoneShrinkStarted {
                                phase_id,
                                target_radius,
                                duration_secs,
                            },
                            ZoneEvent::ShrinkCompleted { radius } => {
                                GameEvent::ZoneShrinkCompleted { radius }
                            }
                        });
                    }
                }

                game.check_win();

                if game.should_trigger_deathmatch(now) {
                    game.set_state(GameState::Deathmatch);
                }

                if game.state() == GameState::Ending {
                    break;
                }
            }
        })
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let game = Arc::clone(&self.game);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
            loop {
                ticker.tick().await;
                let game = game.lock();
                let (zone_radius, shrink_progress) = game
                    .zone()
                    .map(|z| (z.current_radius(), z.shrink_progress()))
                    .unwrap_or((0.0, 0.0));
                let _ = events.send(GameEvent::Heartbeat {
                    state: game.state(),
                    alive: game.alive_count(),
                    zone_radius,
                    shrink_progress,
                });
                if game.state() == GameState::Ending {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            min_players: 2,
            max_players: 10,
            countdown_secs: 5,
            tick_interval_ms: 250,
            ..Config::default()
        }
    }

    fn setup() -> (Arc<Mutex<Game>>, Arc<GameScheduler>, Config) {
        let config = test_config();
        let game = Arc::new(Mutex::new(Game::new(Uuid::new_v4(), 7, &config)));
        let scheduler = Arc::new(GameScheduler::new(Arc::clone(&game), &config));
        (game, scheduler, config)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_activates_the_match() {
        let (game, scheduler, _) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        {
            let mut game = game.lock();
            game.add_player(a, "a");
            game.add_player(b, "b");
            assert_eq!(game.state(), GameState::Starting);
        }

        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(scheduler.get_countdown_seconds(), 2);
        assert_eq!(game.lock().state(), GameState::Starting);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(game.lock().state(), GameState::Active);
        assert_eq!(scheduler.get_countdown_seconds(), 0);
        assert!(game.lock().started_at().is_some());

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn elimination_mid_match_winds_the_scheduler_down() {
        let (game, scheduler, _) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        {
            let mut game = game.lock();
            game.add_player(a, "a");
            game.add_player(b, "b");
        }
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(game.lock().state(), GameState::Active);

        // A combat handler on another execution context reports the death.
        game.lock().eliminate_player(a);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(game.lock().state(), GameState::Ending);
        assert_eq!(game.lock().winner(), Some(b));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn roster_shrinking_below_minimum_reverts_and_rearms() {
        let (game, scheduler, config) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        {
            let mut game = game.lock();
            game.add_player(a, "a");
            game.add_player(b, "b");
        }
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(2)).await;
        game.lock().remove_player(b);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(game.lock().state(), GameState::Waiting);
        assert_eq!(scheduler.get_countdown_seconds(), 0);
        assert!(scheduler.is_running());

        // Countdown must not keep running towards activation.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(game.lock().state(), GameState::Waiting);

        // Rejoining restarts a full countdown.
        game.lock().add_player(b, "b");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(scheduler.get_countdown_seconds(), config.countdown_secs - 1);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(game.lock().state(), GameState::Active);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn deathmatch_transition_keeps_the_scheduler_driving() {
        let config = Config {
            min_players: 2,
            countdown_secs: 1,
            match_duration_secs: 30.0,
            tick_interval_ms: 250,
            ..Config::default()
        };
        let game = Arc::new(Mutex::new(Game::new(Uuid::new_v4(), 7, &config)));
        game.lock().attach_arena(
            "arena",
            crate::game::zone::Position::new(0.0, 0.0, 64.0),
            1000.0,
            vec![],
        );
        let scheduler = Arc::new(GameScheduler::new(Arc::clone(&game), &config));
        {
            let mut game = game.lock();
            game.add_player(Uuid::new_v4(), "a");
            game.add_player(Uuid::new_v4(), "b");
        }
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(game.lock().state(), GameState::Active);

        // Paused-clock sleeps do not move the wall clock the deathmatch
        // poll compares against, so the trigger is exercised directly.
        let start = game.lock().started_at().unwrap();
        assert!(!game.lock().should_trigger_deathmatch(start + 29_000));
        assert!(game.lock().should_trigger_deathmatch(start + 30_000));

        game.lock().set_state(GameState::Deathmatch);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.is_running());
        assert!(game.lock().zone().unwrap().is_shrinking());

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_cycles_leave_no_orphans() {
        let (game, scheduler, _) = setup();
        {
            let mut game = game.lock();
            game.add_player(Uuid::new_v4(), "a");
            game.add_player(Uuid::new_v4(), "b");
        }

        scheduler.stop();
        assert_eq!(scheduler.task_count(), 0);

        for _ in 0..3 {
            scheduler.start();
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(scheduler.task_count() > 0);
            scheduler.stop();
            scheduler.stop();
            assert_eq!(scheduler.task_count(), 0);
            assert!(!scheduler.is_running());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_while_the_match_is_live() {
        let (game, scheduler, _) = setup();
        let mut rx = game.lock().subscribe();
        {
            let mut game = game.lock();
            game.add_player(Uuid::new_v4(), "a");
            game.add_player(Uuid::new_v4(), "b");
        }
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.stop();

        let mut countdown_ticks = 0;
        let mut heartbeats = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                GameEvent::CountdownTick { .. } => countdown_ticks += 1,
                GameEvent::Heartbeat { state, alive, .. } => {
                    assert_eq!(state, GameState::Active);
                    assert_eq!(alive, 2);
                    heartbeats += 1;
                }
                _ => {}
            }
        }
        assert_eq!(countdown_ticks, 5);
        assert!(heartbeats >= 3);
    }
}
