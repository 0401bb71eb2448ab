//! Player commands and the per-tick movement they drive.

use crate::config::RoomConfig;
use crate::physics::PhysicsEngine;
use crate::world::WorldState;
use log::warn;
use shared::geometry::Vector2;
use shared::SessionId;
use std::f32::consts::FRAC_PI_2;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    MoveLeftStart,
    MoveLeftStop,
    MoveRightStart,
    MoveRightStop,
    RotateLeft,
    RotateRight,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown input command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for InputCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move-left-start" => Ok(InputCommand::MoveLeftStart),
            "move-left-stop" => Ok(InputCommand::MoveLeftStop),
            "move-right-start" => Ok(InputCommand::MoveRightStart),
            "move-right-stop" => Ok(InputCommand::MoveRightStop),
            "rotate-left" => Ok(InputCommand::RotateLeft),
            "rotate-right" => Ok(InputCommand::RotateRight),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl InputCommand {
    pub const ALL: [InputCommand; 6] = [
        InputCommand::MoveLeftStart,
        InputCommand::MoveLeftStop,
        InputCommand::MoveRightStart,
        InputCommand::MoveRightStop,
        InputCommand::RotateLeft,
        InputCommand::RotateRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InputCommand::MoveLeftStart => "move-left-start",
            InputCommand::MoveLeftStop => "move-left-stop",
            InputCommand::MoveRightStart => "move-right-start",
            InputCommand::MoveRightStop => "move-right-stop",
            InputCommand::RotateLeft => "rotate-left",
            InputCommand::RotateRight => "rotate-right",
        }
    }
}

/// Applies one `player-input` command for `session`.
///
/// Moves only update the stored delta, last command wins. Rotations turn
/// the body right away. Unknown commands and sessions without a block are
/// logged and ignored.
pub fn apply_input<E: PhysicsEngine>(
    world: &mut WorldState,
    engine: &mut E,
    config: &RoomConfig,
    session: SessionId,
    raw: &str,
) {
    let command = match raw.parse::<InputCommand>() {
        Ok(command) => command,
        Err(e) => {
            warn!("Unknown input type from session {}: {}", session, e);
            return;
        }
    };

    let Some(block) = world.controlled_block(session) else {
        warn!(
            "Session {} sent {} without a controlled block",
            session,
            command.as_str()
        );
        return;
    };

    match command {
        InputCommand::MoveLeftStart => {
            world.set_input_dx(block, -config.move_step);
        }
        InputCommand::MoveRightStart => {
            world.set_input_dx(block, config.move_step);
        }
        InputCommand::MoveLeftStop | InputCommand::MoveRightStop => {
            world.set_input_dx(block, 0.0);
        }
        InputCommand::RotateLeft | InputCommand::RotateRight => {
            let angle = if command == InputCommand::RotateLeft {
                -FRAC_PI_2
            } else {
                FRAC_PI_2
            };
            if !engine.rotate(block, angle) {
                warn!("Cannot rotate block {}: body is gone", block);
            }
        }
    }
}

/// Runs before every physics step.
///
/// Controlled blocks are translated by their delta and have their vertical
/// velocity pinned to the controlled fall speed. Every other dynamic body
/// gets a downward force for the configured fall acceleration.
pub fn apply_player_movement<E: PhysicsEngine>(
    world: &WorldState,
    engine: &mut E,
    config: &RoomConfig,
) {
    for (session, block) in world.controlled() {
        let delta = world.input_delta(block).unwrap_or(Vector2::ZERO);
        let Some(body) = engine.body(block) else {
            warn!("Controlled block {} of session {} is missing", block, session);
            continue;
        };
        engine.translate(block, delta);
        engine.set_velocity(
            block,
            Vector2::new(body.velocity.x, config.controlled_fall_speed),
        );
    }

    for body in engine.bodies() {
        if body.is_static || world.is_controlled(body.id) {
            continue;
        }
        engine.apply_force(
            body.id,
            Vector2::new(0.0, body.mass * config.uncontrolled_fall_acceleration),
        );
    }
}
