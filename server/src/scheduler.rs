//! Fixed-rate stepping with ordered update hooks.
//!
//! A tick runs, in order: every `before_update` hook, one engine step with
//! the measured delta, every `after_update` hook, then every
//! `collision_start` hook if the step reported new contacts. Hooks run
//! synchronously on the room task; the first error aborts the tick.

use crate::config::RoomConfig;
use crate::error::RoomError;
use crate::physics::{CollisionPair, PhysicsEngine};
use crate::sync::DeltaSynchronizer;
use crate::world::WorldState;
use log::{debug, warn};
use rand::rngs::StdRng;
use shared::RoomMessage;
use std::time::{Duration, Instant};

/// Mutable view of a room handed to every hook.
pub struct TickContext<'a, E> {
    pub world: &'a mut WorldState,
    pub engine: &'a mut E,
    pub config: &'a RoomConfig,
    pub rng: &'a mut StdRng,
    pub sync: &'a mut DeltaSynchronizer,
    /// Messages to broadcast once the tick completes.
    pub outbox: &'a mut Vec<RoomMessage>,
    /// Collision-start pairs from this tick's step.
    pub collisions: Vec<CollisionPair>,
    pub tick: u64,
}

pub type Hook<E> = Box<dyn FnMut(&mut TickContext<'_, E>) -> Result<(), RoomError> + Send>;

pub struct TickScheduler<E> {
    before_update: Vec<Hook<E>>,
    after_update: Vec<Hook<E>>,
    collision_start: Vec<Hook<E>>,
    running: bool,
    tick: u64,
    last_tick: Option<Instant>,
    max_step: Duration,
}

impl<E: PhysicsEngine + 'static> TickScheduler<E> {
    pub fn new(max_step: Duration) -> Self {
        Self {
            before_update: Vec::new(),
            after_update: Vec::new(),
            collision_start: Vec::new(),
            running: false,
            tick: 0,
            last_tick: None,
            max_step,
        }
    }

    pub fn on_before_update(&mut self, hook: Hook<E>) {
        self.before_update.push(hook);
    }

    pub fn on_after_update(&mut self, hook: Hook<E>) {
        self.after_update.push(hook);
    }

    pub fn on_collision_start(&mut self, hook: Hook<E>) {
        self.collision_start.push(hook);
    }

    pub fn hook_count(&self) -> usize {
        self.before_update.len() + self.after_update.len() + self.collision_start.len()
    }

    pub fn detach_all(&mut self) {
        self.before_update.clear();
        self.after_update.clear();
        self.collision_start.clear();
    }

    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.last_tick = Some(now);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.last_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Wall-clock time since the previous tick, capped at `max_step`.
    pub fn measure(&mut self, now: Instant) -> Duration {
        let dt = match self.last_tick {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);

        if dt > self.max_step {
            warn!(
                "Tick {} took {:.1}ms, capping step at {:.1}ms",
                self.tick + 1,
                dt.as_secs_f64() * 1000.0,
                self.max_step.as_secs_f64() * 1000.0
            );
            return self.max_step;
        }
        dt
    }

    /// Runs one tick. Does nothing while stopped.
    pub fn step(&mut self, ctx: &mut TickContext<'_, E>, dt: Duration) -> Result<(), RoomError> {
        if !self.running {
            return Ok(());
        }
        self.tick += 1;
        ctx.tick = self.tick;
        ctx.collisions.clear();

        for hook in self.before_update.iter_mut() {
            hook(&mut *ctx)?;
        }

        ctx.collisions = ctx.engine.step(dt)?;

        for hook in self.after_update.iter_mut() {
            hook(&mut *ctx)?;
        }

        if !ctx.collisions.is_empty() {
            for hook in self.collision_start.iter_mut() {
                hook(&mut *ctx)?;
            }
        }

        if self.tick % 60 == 0 {
            let hz = if dt.is_zero() {
                0.0
            } else {
                1.0 / dt.as_secs_f64()
            };
            debug!(
                "Tick {}: {} bodies, {:.1}Hz",
                self.tick,
                ctx.engine.bodies().len(),
                hz
            );
        }

        Ok(())
    }
}
