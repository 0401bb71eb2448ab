//! Turns collision-start events into respawns.
//!
//! Each session is either waiting for the game to start or controlling
//! exactly one block. When that block touches anything, it is retired in
//! place as an obstacle and the session gets a new block at its lane.

use crate::error::RoomError;
use crate::physics::{CollisionPair, PhysicsEngine};
use crate::world::WorldState;
use log::{info, warn};
use rand::rngs::StdRng;
use shared::{BlockRecord, SessionId, SPAWN_Y};

/// Spawns a fresh block for `session` at its lane and hands control over.
/// Returns `None` if the session has no lane, in which case it also stops
/// controlling its old block.
pub fn respawn<E: PhysicsEngine>(
    world: &mut WorldState,
    engine: &mut E,
    rng: &mut StdRng,
    session: SessionId,
) -> Result<Option<BlockRecord>, RoomError> {
    let Some(x) = world.spawn_x(session) else {
        warn!("No spawn lane for session {}, retiring its block", session);
        world.retire_control(session);
        return Ok(None);
    };

    let record = world.spawn_block(engine, rng, x, SPAWN_Y)?;
    world.assign_control(session, record.id);
    Ok(Some(record))
}

/// Handles one batch of collision-start pairs. Returns the blocks created.
pub fn route_collisions<E: PhysicsEngine>(
    world: &mut WorldState,
    engine: &mut E,
    rng: &mut StdRng,
    pairs: &[CollisionPair],
) -> Result<Vec<BlockRecord>, RoomError> {
    let mut created = Vec::new();
    for pair in pairs {
        // re-read per pair: an earlier pair may already have retired a block
        for (session, block) in world.controlled() {
            if !pair.contains(block) {
                continue;
            }
            info!(
                "Block {} of session {} landed on {}",
                block,
                session,
                if pair.a == block { pair.b } else { pair.a }
            );
            if let Some(record) = respawn(world, engine, rng, session)? {
                created.push(record);
            }
        }
    }
    Ok(created)
}
