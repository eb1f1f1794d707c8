//! Shrinking play-area engine
//!
//! The zone is a cylinder: containment and edge distance are computed on
//! the horizontal plane only, so altitude never pushes a player outside.
//! All time inputs are unix milliseconds supplied by the scheduler.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::time::secs_to_millis;

/// A point in the arena. `z` is vertical and ignored for containment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance on the horizontal plane
    pub fn horizontal_distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One configured stage of the shrink sequence (immutable value)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonePhase {
    pub id: u32,
    /// Delay before this phase's shrink begins (seconds)
    pub wait_secs: f32,
    /// Shrink duration (seconds)
    pub shrink_secs: f32,
    /// Radius the zone shrinks to
    pub target_radius: f32,
    /// Damage applied per damage tick to players outside the zone
    pub damage_per_tick: f32,
    /// Interval between damage ticks (seconds)
    pub tick_interval_secs: f32,
}

impl ZonePhase {
    /// Standard four-stage sequence for a 1000-radius arena
    pub fn default_phases() -> Vec<ZonePhase> {
        vec![
            ZonePhase {
                id: 1,
                wait_secs: 60.0,
                shrink_secs: 30.0,
                target_radius: 500.0,
                damage_per_tick: 1.0,
                tick_interval_secs: 1.0,
            },
            ZonePhase {
                id: 2,
                wait_secs: 45.0,
                shrink_secs: 25.0,
                target_radius: 250.0,
                damage_per_tick: 2.0,
                tick_interval_secs: 1.0,
            },
            ZonePhase {
                id: 3,
                wait_secs: 30.0,
                shrink_secs: 20.0,
                target_radius: 100.0,
                damage_per_tick: 3.0,
                tick_interval_secs: 0.5,
            },
            ZonePhase {
                id: 4,
                wait_secs: 20.0,
                shrink_secs: 15.0,
                target_radius: 50.0,
                damage_per_tick: 5.0,
                tick_interval_secs: 0.5,
            },
        ]
    }
}

/// Events surfaced by [`Zone::tick`] for the scheduler to broadcast
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneEvent {
    ShrinkStarted {
        phase_id: u32,
        target_radius: f32,
        duration_secs: f32,
    },
    ShrinkCompleted {
        radius: f32,
    },
}

/// The shrinking play area for one match.
///
/// Owned by its `Game` and mutated only from the scheduler tick. The
/// radius never grows: a shrink plan may be refined to a stricter target
/// but never reversed, and once a shrink completes the radius sits exactly
/// on the target.
#[derive(Debug, Clone)]
pub struct Zone {
    /// World the arena lives in (opaque to the core)
    world: String,
    center: Position,

    current_radius: f32,
    target_radius: f32,
    start_radius: f32,

    shrinking: bool,
    complete: bool,
    shrink_started_at: u64,
    shrink_duration_secs: f32,
    progress: f32,

    phases: Vec<ZonePhase>,
    phase_idx: usize,
    armed: bool,
    next_phase_at: u64,

    damage_per_tick: f32,
    tick_interval_secs: f32,
}

impl Zone {
    pub fn new(
        world: impl Into<String>,
        center: Position,
        initial_radius: f32,
        phases: Vec<ZonePhase>,
    ) -> Self {
        let (damage_per_tick, tick_interval_secs) = phases
            .first()
            .map(|p| (p.damage_per_tick, p.tick_interval_secs))
            .unwrap_or((1.0, 1.0));

        Self {
            world: world.into(),
            center,
            current_radius: initial_radius,
            target_radius: initial_radius,
            start_radius: initial_radius,
            shrinking: false,
            complete: false,
            shrink_started_at: 0,
            shrink_duration_secs: 0.0,
            progress: 0.0,
            phases,
            phase_idx: 0,
            armed: false,
            next_phase_at: 0,
            damage_per_tick,
            tick_interval_secs,
        }
    }

    /// Arm the phase schedule; the first phase's wait starts counting now.
    /// Called when the match goes active.
    pub fn arm(&mut self, now_ms: u64) {
        if self.phases.is_empty() {
            return;
        }
        self.armed = true;
        self.next_phase_at = now_ms + secs_to_millis(self.phases[self.phase_idx].wait_secs);
    }

    /// Stop automatic phase progression (deathmatch override)
    pub fn clear_schedule(&mut self) {
        self.armed = false;
    }

    /// Begin a shrink towards `target_radius` over `duration_secs`.
    ///
    /// Rejected when the target is above the current radius (the zone
    /// never grows) or when it would loosen an in-progress shrink; a
    /// stricter target re-plans from the current radius.
    pub fn start_shrink(&mut self, target_radius: f32, duration_secs: f32, now_ms: u64) -> bool {
        if target_radius > self.current_radius {
            warn!(
                target_radius,
                current_radius = self.current_radius,
                "Rejected shrink: zone never grows"
            );
            return false;
        }
        if self.shrinking && target_radius > self.target_radius {
            warn!(
                target_radius,
                planned_target = self.target_radius,
                "Rejected shrink: cannot loosen an in-progress shrink"
            );
            return false;
        }

        self.start_radius = self.current_radius;
        self.target_radius = target_radius;
        self.shrink_started_at = now_ms;
        self.shrink_duration_secs = duration_secs.max(0.0);
        self.shrinking = true;
        self.complete = false;
        self.progress = 0.0;
        debug!(
            world = %self.world,
            target_radius,
            duration_secs,
            "Zone shrink started"
        );
        true
    }

    /// Replace the active plan with a forced phase (deathmatch finale):
    /// clears the schedule, adopts the phase's damage metadata, and starts
    /// its shrink under the normal refine-only rules.
    pub fn force_phase(&mut self, phase: ZonePhase, now_ms: u64) -> bool {
        self.clear_schedule();
        if self.start_shrink(phase.target_radius, phase.shrink_secs, now_ms) {
            self.damage_per_tick = phase.damage_per_tick;
            self.tick_interval_secs = phase.tick_interval_secs;
            true
        } else {
            false
        }
    }

    /// Advance the zone by one scheduler tick.
    ///
    /// Starts the next scheduled phase when its wait expires, then moves
    /// the radius along the linear interpolation between the shrink's
    /// start radius and its target. A zero-duration shrink completes on
    /// the first tick after it starts.
    pub fn tick(&mut self, now_ms: u64) -> Vec<ZoneEvent> {
        let mut events = Vec::new();

        if self.armed && !self.shrinking && self.phase_idx < self.phases.len() {
            if now_ms >= self.next_phase_at {
                let phase = self.phases[self.phase_idx];
                if self.start_shrink(phase.target_radius, phase.shrink_secs, now_ms) {
                    self.damage_per_tick = phase.damage_per_tick;
                    self.tick_interval_secs = phase.tick_interval_secs;
                    events.push(ZoneEvent::ShrinkStarted {
                        phase_id: phase.id,
                        target_radius: phase.target_radius,
                        duration_secs: phase.shrink_secs,
                    });
                } else {
                    // A phase that cannot start (target at or above the
                    // current radius) would stall the schedule; skip it.
                    warn!(phase_id = phase.id, "Skipping unstartable zone phase");
                    self.advance_schedule(now_ms);
                }
            }
        }

        if self.shrinking {
            let fraction = if self.shrink_duration_secs <= 0.0 {
                1.0
            } else {
                let elapsed_secs = now_ms.saturating_sub(self.shrink_started_at) as f32 / 1000.0;
                (elapsed_secs / self.shrink_duration_secs).clamp(0.0, 1.0)
            };

            self.progress = fraction;
            self.current_radius =
                self.start_radius + (self.target_radius - self.start_radius) * fraction;

            if fraction >= 1.0 {
                self.current_radius = self.target_radius;
                self.shrinking = false;
                self.complete = true;
                events.push(ZoneEvent::ShrinkCompleted {
                    radius: self.current_radius,
                });
                if self.armed {
                    self.advance_schedule(now_ms);
                }
            }
        }

        events
    }

    fn advance_schedule(&mut self, now_ms: u64) {
        self.phase_idx += 1;
        if self.phase_idx < self.phases.len() {
            self.next_phase_at = now_ms + secs_to_millis(self.phases[self.phase_idx].wait_secs);
        } else {
            self.armed = false;
        }
    }

    /// True iff the point is inside or on the zone boundary
    pub fn is_in_zone(&self, point: &Position) -> bool {
        self.center.horizontal_distance(point) <= self.current_radius
    }

    /// Signed distance to the zone edge: positive inside, negative outside
    pub fn distance_to_edge(&self, point: &Position) -> f32 {
        self.current_radius - self.center.horizontal_distance(point)
    }

    /// Elapsed fraction of the active (or last) shrink, in `[0, 1]`
    pub fn shrink_progress(&self) -> f32 {
        self.progress
    }

    pub fn is_shrinking(&self) -> bool {
        self.shrinking
    }

    /// True once a shrink has run to completion; the radius then equals
    /// the target exactly.
    pub fn is_shrink_complete(&self) -> bool {
        self.complete
    }

    pub fn current_radius(&self) -> f32 {
        self.current_radius
    }

    pub fn target_radius(&self) -> f32 {
        self.target_radius
    }

    pub fn center(&self) -> Position {
        self.center
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    /// Damage applied per damage tick while a player is outside the zone
    pub fn damage_per_tick(&self) -> f32 {
        self.damage_per_tick
    }

    /// Interval between out-of-zone damage ticks (seconds)
    pub fn tick_interval_secs(&self) -> f32 {
        self.tick_interval_secs
    }
}
