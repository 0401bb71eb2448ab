//! Runtime tunables for a room.

use shared::FLOOR_THRESHOLD;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Delay between `game-started` and the first tick.
    pub start_delay: Duration,
    /// Upper bound on the measured delta handed to the engine.
    pub max_step: Duration,
    /// World gravity in units/s². Zero: controlled blocks are driven manually.
    pub gravity: f32,
    /// Downward velocity (units/s) a controlled block is reset to every tick.
    pub controlled_fall_speed: f32,
    /// Downward acceleration (units/s²) applied to uncontrolled blocks.
    pub uncontrolled_fall_acceleration: f32,
    /// Horizontal translation per tick while a move key is held.
    pub move_step: f32,
    pub floor_threshold: f32,
    /// Seed for block shape, colour and rotation. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            start_delay: Duration::from_millis(1000),
            max_step: Duration::from_millis(50),
            gravity: 0.0,
            controlled_fall_speed: 60.0,
            uncontrolled_fall_acceleration: 240.0,
            move_step: 3.0,
            floor_threshold: FLOOR_THRESHOLD,
            seed: None,
        }
    }
}

impl RoomConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
