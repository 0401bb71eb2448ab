//! Canonical per-room state: players, blocks and the bookkeeping that
//! ties sessions to the block they control.
//!
//! `controlled` (session → block) and `input_deltas` (block → delta) are
//! only ever changed together, through [`WorldState::assign_control`] and
//! [`WorldState::retire_control`], so the set of controlled blocks always
//! equals the set of blocks with an input delta.

use crate::config::RoomConfig;
use crate::error::RoomError;
use crate::physics::{BodyDesc, PhysicsEngine};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::geometry::Vector2;
use shared::shapes::{COLOURS, ROTATIONS};
use shared::{
    BlockId, BlockRecord, Player, PlayerProfile, SessionId, ShapeType, BOUNDARY_WALL_OFFSET,
    FLOOR_HEIGHT, FLOOR_WIDTH, FLOOR_Y, LANE_SPACING, LANE_START_X, SPAWN_Y, WALL_HEIGHT,
    WALL_OFFSET, WALL_WIDTH, WALL_Y,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Initial downward velocity given to every new block.
const SPAWN_VELOCITY: Vector2 = Vector2::new(0.0, 1.0);

#[derive(Debug, Default)]
pub struct WorldState {
    /// Keyed by user id.
    players: BTreeMap<String, Player>,
    sessions: HashMap<SessionId, String>,
    controlled: BTreeMap<SessionId, BlockId>,
    input_deltas: HashMap<BlockId, Vector2>,
    spawn_x: HashMap<SessionId, f32>,
    static_bodies: BTreeSet<BlockId>,
    blocks: BTreeMap<BlockId, BlockRecord>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player for a new session. Returns false if the session
    /// already has one.
    pub fn create_player(&mut self, session: SessionId, profile: PlayerProfile) -> bool {
        if self.sessions.contains_key(&session) {
            return false;
        }

        // same user on a new connection replaces the old entry
        if let Some(previous) = self.players.get(&profile.user_id) {
            let stale = previous.session_id;
            self.sessions.remove(&stale);
            self.forget_session(stale);
        }

        info!(
            "Player {} ({}) joined as session {}",
            profile.display_name, profile.user_id, session
        );
        self.sessions.insert(session, profile.user_id.clone());
        self.players
            .insert(profile.user_id.clone(), Player::new(session, profile));
        true
    }

    /// Removes the session's player, retiring any block it controls.
    pub fn remove_player(&mut self, session: SessionId) -> Option<Player> {
        let user_id = self.sessions.remove(&session)?;
        self.forget_session(session);
        let player = self.players.remove(&user_id);
        if let Some(player) = &player {
            info!("Player {} left (session {})", player.user_id, session);
        }
        player
    }

    fn forget_session(&mut self, session: SessionId) {
        self.retire_control(session);
        self.spawn_x.remove(&session);
    }

    pub fn player(&self, session: SessionId) -> Option<&Player> {
        self.sessions
            .get(&session)
            .and_then(|user_id| self.players.get(user_id))
    }

    fn player_mut(&mut self, session: SessionId) -> Option<&mut Player> {
        let user_id = self.sessions.get(&session)?;
        self.players.get_mut(user_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn set_ready(&mut self, session: SessionId, ready: bool) -> bool {
        match self.player_mut(session) {
            Some(player) => {
                player.ready = ready;
                true
            }
            None => false,
        }
    }

    /// True when every player is ready. Vacuously true for an empty room.
    pub fn all_ready(&self) -> bool {
        self.players.values().all(|p| p.ready)
    }

    /// Builds the arena and gives every ready player a block.
    ///
    /// One boundary wall goes left of the first lane; each ready player
    /// then gets a lane with a floor segment and a separating wall, in
    /// session order.
    pub fn start_game<E: PhysicsEngine>(
        &mut self,
        engine: &mut E,
        rng: &mut StdRng,
        config: &RoomConfig,
    ) -> Result<Vec<BlockRecord>, RoomError> {
        engine.set_gravity(Vector2::new(0.0, config.gravity));

        let mut x = LANE_START_X;
        self.add_static(
            engine,
            BodyDesc::rectangle(x + BOUNDARY_WALL_OFFSET, WALL_Y, WALL_WIDTH, WALL_HEIGHT, true),
        );

        let mut ready: Vec<SessionId> = self
            .players
            .values()
            .filter(|p| p.ready)
            .map(|p| p.session_id)
            .collect();
        ready.sort_unstable();

        let mut spawned = Vec::with_capacity(ready.len());
        for session in ready {
            let block = self.spawn_block(engine, rng, x, SPAWN_Y)?;
            self.assign_control(session, block.id);
            self.spawn_x.insert(session, x);
            if let Some(player) = self.player_mut(session) {
                player.x = x;
                player.y = SPAWN_Y;
            }
            spawned.push(block);

            self.add_static(
                engine,
                BodyDesc::rectangle(x, FLOOR_Y, FLOOR_WIDTH, FLOOR_HEIGHT, true),
            );
            self.add_static(
                engine,
                BodyDesc::rectangle(x + WALL_OFFSET, WALL_Y, WALL_WIDTH, WALL_HEIGHT, true),
            );
            x += LANE_SPACING;
        }

        info!("Game started, controlled blocks: {:?}", self.controlled);
        Ok(spawned)
    }

    fn add_static<E: PhysicsEngine>(&mut self, engine: &mut E, desc: BodyDesc) -> BlockId {
        let id = engine.add_body(desc);
        self.static_bodies.insert(id);
        id
    }

    /// Creates a random block body at `(x, y)`.
    pub fn spawn_block<E: PhysicsEngine>(
        &mut self,
        engine: &mut E,
        rng: &mut StdRng,
        x: f32,
        y: f32,
    ) -> Result<BlockRecord, RoomError> {
        let shape_type = ShapeType::ALL[rng.gen_range(0..ShapeType::ALL.len())];
        let colour = COLOURS[rng.gen_range(0..COLOURS.len())];
        let rotation = ROTATIONS[rng.gen_range(0..ROTATIONS.len())];

        let desc = BodyDesc::from_outline(x, y, &shape_type.outline())?
            .with_angle(rotation)
            .with_velocity(SPAWN_VELOCITY);
        let id = engine.add_body(desc);

        let record = BlockRecord {
            id,
            shape_type,
            x,
            y,
            rotation,
            colour: colour.to_string(),
        };
        info!(
            "Spawned {} block {} at ({}, {}) rotation {:.3}",
            shape_type, id, x, y, rotation
        );
        self.blocks.insert(id, record.clone());
        Ok(record)
    }

    /// Points the session at `block` with a fresh zero delta. The previous
    /// block, if any, loses its delta in the same step.
    pub fn assign_control(&mut self, session: SessionId, block: BlockId) {
        if let Some(previous) = self.controlled.insert(session, block) {
            self.input_deltas.remove(&previous);
        }
        self.input_deltas.insert(block, Vector2::ZERO);
    }

    /// Stops the session controlling anything. The body stays in the world.
    pub fn retire_control(&mut self, session: SessionId) -> Option<BlockId> {
        let block = self.controlled.remove(&session)?;
        self.input_deltas.remove(&block);
        debug!("Session {} retired block {}", session, block);
        Some(block)
    }

    pub fn controlled_block(&self, session: SessionId) -> Option<BlockId> {
        self.controlled.get(&session).copied()
    }

    pub fn controller_of(&self, block: BlockId) -> Option<SessionId> {
        self.controlled
            .iter()
            .find(|(_, b)| **b == block)
            .map(|(&session, _)| session)
    }

    /// Snapshot of every (session, block) pair, in session order.
    pub fn controlled(&self) -> Vec<(SessionId, BlockId)> {
        self.controlled.iter().map(|(&s, &b)| (s, b)).collect()
    }

    pub fn is_controlled(&self, block: BlockId) -> bool {
        self.input_deltas.contains_key(&block)
    }

    pub fn input_delta(&self, block: BlockId) -> Option<Vector2> {
        self.input_deltas.get(&block).copied()
    }

    /// Overwrites the horizontal component. Returns false if the block is
    /// not controlled.
    pub fn set_input_dx(&mut self, block: BlockId, dx: f32) -> bool {
        match self.input_deltas.get_mut(&block) {
            Some(delta) => {
                delta.x = dx;
                true
            }
            None => false,
        }
    }

    pub fn spawn_x(&self, session: SessionId) -> Option<f32> {
        self.spawn_x.get(&session).copied()
    }

    pub fn is_static(&self, id: BlockId) -> bool {
        self.static_bodies.contains(&id)
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockRecord> {
        self.blocks.get(&id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Removes every non-static body below `threshold` from the engine and
    /// from the block records. Returns the removed ids.
    pub fn remove_fallen<E: PhysicsEngine>(&mut self, engine: &mut E, threshold: f32) -> Vec<BlockId> {
        let fallen: Vec<BlockId> = engine
            .bodies()
            .into_iter()
            .filter(|b| !self.static_bodies.contains(&b.id) && b.position.y > threshold)
            .map(|b| b.id)
            .collect();

        for &id in &fallen {
            if !engine.remove_body(id) {
                warn!("Fallen block {} already gone from the engine", id);
            }
            self.blocks.remove(&id);
            debug!("Block {} fell out of the world", id);
        }
        fallen
    }

    /// Checks that controlled blocks and input deltas cover the same ids.
    pub fn control_consistent(&self) -> bool {
        self.controlled.len() == self.input_deltas.len()
            && self
                .controlled
                .values()
                .all(|b| self.input_deltas.contains_key(b))
    }

    /// Drops all game state. Players stay.
    pub fn clear_game(&mut self) {
        self.controlled.clear();
        self.input_deltas.clear();
        self.spawn_x.clear();
        self.static_bodies.clear();
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::SimpleEngine;
    use rand::SeedableRng;

    fn profile(user: &str) -> PlayerProfile {
        PlayerProfile {
            user_id: user.to_string(),
            display_name: user.to_uppercase(),
            avatar_ref: String::new(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_create_and_remove_player() {
        let mut world = WorldState::new();
        assert!(world.create_player(1, profile("alice")));
        assert!(!world.create_player(1, profile("bob")));
        assert_eq!(world.player_count(), 1);
        assert_eq!(world.player(1).unwrap().user_id, "alice");

        let removed = world.remove_player(1).unwrap();
        assert_eq!(removed.session_id, 1);
        assert!(world.remove_player(1).is_none());
        assert_eq!(world.player_count(), 0);
    }

    #[test]
    fn test_rejoin_replaces_old_session() {
        let mut world = WorldState::new();
        world.create_player(1, profile("alice"));
        world.create_player(2, profile("alice"));

        assert_eq!(world.player_count(), 1);
        assert!(world.player(1).is_none());
        assert_eq!(world.player(2).unwrap().session_id, 2);
    }

    #[test]
    fn test_all_ready() {
        let mut world = WorldState::new();
        assert!(world.all_ready());

        world.create_player(1, profile("alice"));
        world.create_player(2, profile("bob"));
        assert!(!world.all_ready());

        world.set_ready(1, true);
        assert!(!world.all_ready());
        world.set_ready(2, true);
        assert!(world.all_ready());

        assert!(!world.set_ready(9, true));
    }

    #[test]
    fn test_start_game_lays_out_lanes() {
        let mut world = WorldState::new();
        let mut engine = SimpleEngine::new();
        world.create_player(1, profile("alice"));
        world.create_player(2, profile("bob"));
        world.create_player(3, profile("carol"));
        world.set_ready(1, true);
        world.set_ready(2, true);

        let spawned = world
            .start_game(&mut engine, &mut rng(), &RoomConfig::default())
            .unwrap();

        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].x, 75.0);
        assert_eq!(spawned[1].x, 275.0);
        assert!(spawned.iter().all(|b| b.y == 0.0));

        // boundary wall + (block, floor, wall) per ready player
        assert_eq!(engine.bodies().len(), 1 + 3 * 2);
        assert_eq!(world.controlled_block(1), Some(spawned[0].id));
        assert_eq!(world.controlled_block(2), Some(spawned[1].id));
        assert_eq!(world.controlled_block(3), None);
        assert_eq!(world.spawn_x(2), Some(275.0));
        assert!(world.control_consistent());

        let statics = engine.bodies().iter().filter(|b| b.is_static).count();
        assert_eq!(statics, 5);
    }

    #[test]
    fn test_assign_control_replaces_atomically() {
        let mut world = WorldState::new();
        world.assign_control(1, 10);
        world.set_input_dx(10, 3.0);

        world.assign_control(1, 11);
        assert!(world.input_delta(10).is_none());
        assert_eq!(world.input_delta(11).unwrap().x, 0.0);
        assert_eq!(world.controller_of(11), Some(1));
        assert!(world.control_consistent());

        assert_eq!(world.retire_control(1), Some(11));
        assert!(world.input_delta(11).is_none());
        assert!(world.control_consistent());
    }

    #[test]
    fn test_remove_player_retires_control() {
        let mut world = WorldState::new();
        world.create_player(1, profile("alice"));
        world.assign_control(1, 10);

        world.remove_player(1);
        assert!(world.controlled().is_empty());
        assert!(!world.is_controlled(10));
        assert!(world.control_consistent());
    }

    #[test]
    fn test_remove_fallen_skips_statics() {
        let mut world = WorldState::new();
        let mut engine = SimpleEngine::new();
        let floor = world.add_static(
            &mut engine,
            BodyDesc::rectangle(0.0, 900.0, 100.0, 20.0, true),
        );
        let low = world.spawn_block(&mut engine, &mut rng(), 0.0, 600.0).unwrap();
        let high = world.spawn_block(&mut engine, &mut rng(), 0.0, 100.0).unwrap();

        let fallen = world.remove_fallen(&mut engine, 500.0);
        assert_eq!(fallen, vec![low.id]);
        assert!(engine.body(low.id).is_none());
        assert!(world.block(low.id).is_none());
        assert!(engine.body(high.id).is_some());
        assert!(engine.body(floor).is_some());
    }
}
