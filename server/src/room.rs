//! A single game room: roster, lobby messages and the running game.
//!
//! The room itself is synchronous. [`crate::room_runner`] owns it on a
//! dedicated task and feeds it events, timer wake-ups and ticks; every
//! message the room wants delivered is collected in an outbox and drained
//! by the runner.

use crate::collision;
use crate::config::RoomConfig;
use crate::error::RoomError;
use crate::input;
use crate::physics::PhysicsEngine;
use crate::scheduler::{TickContext, TickScheduler};
use crate::sync::{DeltaSynchronizer, RosterSync};
use crate::world::WorldState;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientMessage, PlayerProfile, RoomMessage, SessionId};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    /// `game-started` has been sent; the arena is built at `at`.
    Starting { at: Instant },
    Playing,
    Disposed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Broadcast(RoomMessage),
    /// Broadcast to everyone in the room except `except`.
    BroadcastExcept {
        except: SessionId,
        message: RoomMessage,
    },
    Send {
        session: SessionId,
        message: RoomMessage,
    },
}

pub struct Room<E: PhysicsEngine + 'static> {
    name: String,
    config: RoomConfig,
    phase: RoomPhase,
    world: WorldState,
    engine: E,
    scheduler: TickScheduler<E>,
    sync: DeltaSynchronizer,
    roster: RosterSync,
    rng: StdRng,
    outbox: Vec<Outbound>,
}

impl<E: PhysicsEngine + 'static> Room<E> {
    pub fn new(name: impl Into<String>, config: RoomConfig, engine: E) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let name = name.into();
        info!("Room {} created", name);

        Self {
            name,
            scheduler: TickScheduler::new(config.max_step),
            config,
            phase: RoomPhase::Lobby,
            world: WorldState::new(),
            engine,
            sync: DeltaSynchronizer::default(),
            roster: RosterSync::new(),
            rng,
            outbox: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn scheduler(&self) -> &TickScheduler<E> {
        &self.scheduler
    }

    pub fn is_empty(&self) -> bool {
        self.world.player_count() == 0
    }

    pub fn join(&mut self, session: SessionId, profile: PlayerProfile) -> bool {
        if self.phase == RoomPhase::Disposed {
            warn!("Session {} tried to join disposed room {}", session, self.name);
            return false;
        }
        if !self.world.create_player(session, profile) {
            warn!("Session {} already in room {}", session, self.name);
            return false;
        }
        // the newcomer gets the full roster, everyone else just the change
        let patches = self.roster.diff(self.world.players());
        if !patches.is_empty() {
            self.outbox.push(Outbound::BroadcastExcept {
                except: session,
                message: RoomMessage::Players(patches),
            });
        }
        self.outbox.push(Outbound::Send {
            session,
            message: RoomMessage::Players(self.roster.snapshot()),
        });
        true
    }

    pub fn leave(&mut self, session: SessionId) -> bool {
        if self.world.remove_player(session).is_none() {
            return false;
        }
        self.publish_roster();
        true
    }

    pub fn handle_message(
        &mut self,
        session: SessionId,
        message: ClientMessage,
        now: Instant,
    ) -> Result<(), RoomError> {
        if self.phase == RoomPhase::Disposed {
            return Err(RoomError::Disposed);
        }
        if self.world.player(session).is_none() {
            warn!(
                "Dropping {} from session {} not in room {}",
                message.name(),
                session,
                self.name
            );
            return Ok(());
        }

        match message {
            ClientMessage::ReadyUp(ready) => {
                self.world.set_ready(session, ready);
                self.publish_roster();
                let all_ready = self.world.all_ready();
                self.broadcast(RoomMessage::AllReady(all_ready));
            }
            ClientMessage::StartGameRequested => {
                if self.phase != RoomPhase::Lobby {
                    warn!(
                        "Room {} ignoring start request from session {} in phase {:?}",
                        self.name, session, self.phase
                    );
                    return Ok(());
                }
                self.broadcast(RoomMessage::GameStarted);
                self.phase = RoomPhase::Starting {
                    at: now + self.config.start_delay,
                };
            }
            ClientMessage::PlayerInput(command) => {
                input::apply_input(
                    &mut self.world,
                    &mut self.engine,
                    &self.config,
                    session,
                    &command,
                );
            }
        }
        Ok(())
    }

    /// When the deferred start is due, if one is pending.
    pub fn start_deadline(&self) -> Option<Instant> {
        match self.phase {
            RoomPhase::Starting { at } => Some(at),
            _ => None,
        }
    }

    /// Registers the tick hooks, builds the arena and starts ticking.
    pub fn start_game(&mut self, now: Instant) -> Result<(), RoomError> {
        if !matches!(self.phase, RoomPhase::Starting { .. }) {
            warn!("Room {} start fired in phase {:?}", self.name, self.phase);
            return Ok(());
        }

        self.register_hooks();
        let spawned = self
            .world
            .start_game(&mut self.engine, &mut self.rng, &self.config)?;
        for block in spawned {
            self.sync.track(&block);
            self.broadcast(RoomMessage::BlockCreated { block });
        }
        self.publish_roster();

        self.scheduler.start(now);
        self.phase = RoomPhase::Playing;
        info!("Room {} is playing", self.name);
        Ok(())
    }

    fn register_hooks(&mut self) {
        self.scheduler.on_before_update(Box::new(|ctx| {
            input::apply_player_movement(ctx.world, ctx.engine, ctx.config);
            Ok(())
        }));

        // fallen blocks go first so they never show up in a delta batch
        self.scheduler.on_after_update(Box::new(|ctx| {
            let fallen = ctx
                .world
                .remove_fallen(ctx.engine, ctx.config.floor_threshold);
            for id in fallen {
                ctx.sync.forget(id);
                let Some(session) = ctx.world.controller_of(id) else {
                    continue;
                };
                if let Some(block) = collision::respawn(ctx.world, ctx.engine, ctx.rng, session)? {
                    ctx.sync.track(&block);
                    ctx.outbox.push(RoomMessage::BlockCreated { block });
                }
            }
            Ok(())
        }));

        self.scheduler.on_after_update(Box::new(|ctx| {
            let updates = ctx.sync.compute(&ctx.engine.bodies());
            for batch in ctx.sync.batches(updates) {
                ctx.outbox.push(RoomMessage::BlockUpdates(batch));
            }
            Ok(())
        }));

        self.scheduler.on_collision_start(Box::new(|ctx| {
            let created =
                collision::route_collisions(ctx.world, ctx.engine, ctx.rng, &ctx.collisions)?;
            for block in created {
                ctx.sync.track(&block);
                ctx.outbox.push(RoomMessage::BlockCreated { block });
            }
            Ok(())
        }));
    }

    /// Advances one tick using the wall-clock time since the last one.
    pub fn tick(&mut self, now: Instant) -> Result<(), RoomError> {
        if self.phase != RoomPhase::Playing {
            return Ok(());
        }
        let dt = self.scheduler.measure(now);
        self.step(dt)
    }

    /// Advances one tick by exactly `dt`.
    pub fn step(&mut self, dt: Duration) -> Result<(), RoomError> {
        if self.phase != RoomPhase::Playing {
            return Ok(());
        }

        let mut messages = Vec::new();
        let mut ctx = TickContext {
            world: &mut self.world,
            engine: &mut self.engine,
            config: &self.config,
            rng: &mut self.rng,
            sync: &mut self.sync,
            outbox: &mut messages,
            collisions: Vec::new(),
            tick: 0,
        };
        let result = self.scheduler.step(&mut ctx, dt);

        self.outbox
            .extend(messages.into_iter().map(Outbound::Broadcast));
        result
    }

    /// Stops ticking, clears the world and detaches every hook. Returns
    /// false if the room was already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.phase == RoomPhase::Disposed {
            return false;
        }
        self.scheduler.stop();
        self.engine.clear();
        self.scheduler.detach_all();

        self.world.clear_game();
        self.sync.clear();
        self.phase = RoomPhase::Disposed;
        info!("Room {} disposed", self.name);
        true
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    fn broadcast(&mut self, message: RoomMessage) {
        self.outbox.push(Outbound::Broadcast(message));
    }

    fn publish_roster(&mut self) {
        let patches = self.roster.diff(self.world.players());
        if !patches.is_empty() {
            self.broadcast(RoomMessage::Players(patches));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::SimpleEngine;
    use shared::{PlayerPatch, FLOOR_THRESHOLD};

    fn profile(user: &str) -> PlayerProfile {
        PlayerProfile {
            user_id: user.to_string(),
            display_name: user.to_string(),
            avatar_ref: format!("avatars/{user}.png"),
        }
    }

    fn config() -> RoomConfig {
        RoomConfig {
            seed: Some(11),
            ..RoomConfig::default()
        }
    }

    fn broadcasts(outbound: &[Outbound]) -> Vec<&RoomMessage> {
        outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Broadcast(message) | Outbound::BroadcastExcept { message, .. } => {
                    Some(message)
                }
                Outbound::Send { .. } => None,
            })
            .collect()
    }

    /// Two ready players with the game running.
    fn playing_room() -> Room<SimpleEngine> {
        let mut room = Room::new("test", config(), SimpleEngine::new());
        let now = Instant::now();
        room.join(1, profile("alice"));
        room.join(2, profile("bob"));
        room.handle_message(1, ClientMessage::ReadyUp(true), now).unwrap();
        room.handle_message(2, ClientMessage::ReadyUp(true), now).unwrap();
        room.handle_message(1, ClientMessage::StartGameRequested, now)
            .unwrap();
        room.start_game(now).unwrap();
        room.drain_outbox();
        room
    }

    #[test]
    fn test_join_sends_roster() {
        let mut room = Room::new("test", config(), SimpleEngine::new());
        room.join(1, profile("alice"));
        room.drain_outbox();

        assert!(room.join(2, profile("bob")));
        let out = room.drain_outbox();
        assert_eq!(out.len(), 2);
        match &out[0] {
            Outbound::BroadcastExcept {
                except,
                message: RoomMessage::Players(patches),
            } => {
                assert_eq!(*except, 2);
                assert_eq!(patches.len(), 1);
                assert!(matches!(&patches[0], PlayerPatch::Upsert(p) if p.user_id == "bob"));
            }
            other => panic!("Unexpected outbound {:?}", other),
        }
        match &out[1] {
            Outbound::Send {
                session,
                message: RoomMessage::Players(patches),
            } => {
                assert_eq!(*session, 2);
                assert_eq!(patches.len(), 2);
            }
            other => panic!("Unexpected outbound {:?}", other),
        }

        // nothing addressed to the newcomer repeats the roster
        let to_bob = out
            .iter()
            .filter(|o| match o {
                Outbound::Broadcast(_) => true,
                Outbound::BroadcastExcept { except, .. } => *except != 2,
                Outbound::Send { session, .. } => *session == 2,
            })
            .count();
        assert_eq!(to_bob, 1);

        assert!(!room.join(2, profile("bob")));
    }

    #[test]
    fn test_ready_up_broadcasts_all_ready() {
        let mut room = Room::new("test", config(), SimpleEngine::new());
        let now = Instant::now();
        room.join(1, profile("alice"));
        room.join(2, profile("bob"));
        room.drain_outbox();

        room.handle_message(1, ClientMessage::ReadyUp(true), now).unwrap();
        let out = room.drain_outbox();
        assert_eq!(
            broadcasts(&out).last(),
            Some(&&RoomMessage::AllReady(false))
        );

        room.handle_message(2, ClientMessage::ReadyUp(true), now).unwrap();
        let out = room.drain_outbox();
        assert_eq!(broadcasts(&out).last(), Some(&&RoomMessage::AllReady(true)));
    }

    #[test]
    fn test_start_flow_spawns_one_block_per_ready_player() {
        let mut room = Room::new("test", config(), SimpleEngine::new());
        let now = Instant::now();
        room.join(1, profile("alice"));
        room.join(2, profile("bob"));
        room.handle_message(1, ClientMessage::ReadyUp(true), now).unwrap();
        room.handle_message(2, ClientMessage::ReadyUp(true), now).unwrap();
        room.drain_outbox();

        room.handle_message(1, ClientMessage::StartGameRequested, now)
            .unwrap();
        room.handle_message(2, ClientMessage::StartGameRequested, now)
            .unwrap();
        let out = room.drain_outbox();
        let started = broadcasts(&out)
            .into_iter()
            .filter(|m| **m == RoomMessage::GameStarted)
            .count();
        assert_eq!(started, 1);
        assert_eq!(room.start_deadline(), Some(now + Duration::from_millis(1000)));

        // nothing spawns before the deferred start fires
        assert_eq!(room.engine().bodies().len(), 0);

        room.start_game(now + Duration::from_millis(1000)).unwrap();
        assert_eq!(room.phase(), RoomPhase::Playing);

        let out = room.drain_outbox();
        let created: Vec<_> = broadcasts(&out)
            .into_iter()
            .filter_map(|m| match m {
                RoomMessage::BlockCreated { block } => Some(block.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 2);
        assert_eq!((created[0].x, created[0].y), (75.0, 0.0));
        assert_eq!((created[1].x, created[1].y), (275.0, 0.0));
    }

    #[test]
    fn test_control_invariant_holds_every_tick() {
        let mut room = playing_room();
        let input = |command: &str| ClientMessage::PlayerInput(command.to_string());
        room.handle_message(1, input("move-left-start"), Instant::now())
            .unwrap();
        room.handle_message(2, input("rotate-right"), Instant::now())
            .unwrap();

        for tick in 0..600 {
            if tick == 10 {
                room.handle_message(1, input("move-left-stop"), Instant::now())
                    .unwrap();
            }
            room.step(Duration::from_millis(16)).unwrap();
            assert!(room.world().control_consistent());
            assert_eq!(room.world().controlled().len(), 2);
        }
    }

    #[test]
    fn test_landing_respawns_controlled_block() {
        let mut room = playing_room();
        let first = room.world().controlled_block(1).unwrap();

        let mut created = Vec::new();
        for _ in 0..600 {
            room.step(Duration::from_millis(16)).unwrap();
            for out in room.drain_outbox() {
                if let Outbound::Broadcast(RoomMessage::BlockCreated { block }) = out {
                    created.push(block);
                }
            }
            if room.world().controlled_block(1) != Some(first) {
                break;
            }
        }

        let second = room.world().controlled_block(1).unwrap();
        assert_ne!(second, first);
        assert!(created.iter().any(|b| b.id == second && b.x == 75.0 && b.y == 0.0));
        assert_eq!(room.world().input_delta(second).unwrap().x, 0.0);
        assert!(room.world().input_delta(first).is_none());
        assert!(room.engine().body(first).is_some());
    }

    #[test]
    fn test_fallen_blocks_leave_world_and_deltas() {
        let mut room = playing_room();
        let block = room.world().controlled_block(1).unwrap();

        // push the block past the threshold in one go
        room.engine.translate(block, shared::geometry::Vector2::new(0.0, FLOOR_THRESHOLD + 100.0));
        room.step(Duration::from_millis(16)).unwrap();
        assert!(room.engine().body(block).is_none());

        for _ in 0..5 {
            room.step(Duration::from_millis(16)).unwrap();
        }
        for out in room.drain_outbox() {
            if let Outbound::Broadcast(RoomMessage::BlockUpdates(updates)) = out {
                assert!(updates.iter().all(|u| u.id != block));
                assert!(updates.len() <= 20);
            }
        }
        // the session got a new block
        assert!(room.world().controlled_block(1).is_some());
        assert_ne!(room.world().controlled_block(1), Some(block));
    }

    #[test]
    fn test_leave_retires_control() {
        let mut room = playing_room();
        let block = room.world().controlled_block(2).unwrap();

        assert!(room.leave(2));
        assert!(room.world().controlled_block(2).is_none());
        assert!(room.world().input_delta(block).is_none());
        assert!(room.engine().body(block).is_some());

        let out = room.drain_outbox();
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Broadcast(RoomMessage::Players(p))
                if p == &vec![PlayerPatch::Remove { user_id: "bob".to_string() }]
        )));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut room = playing_room();
        assert!(room.scheduler().hook_count() > 0);

        assert!(room.dispose());
        assert_eq!(room.phase(), RoomPhase::Disposed);
        assert!(room.engine().bodies().is_empty());
        assert_eq!(room.scheduler().hook_count(), 0);
        assert!(!room.scheduler().is_running());

        assert!(!room.dispose());
        assert!(room.step(Duration::from_millis(16)).is_ok());
        assert_eq!(
            room.handle_message(1, ClientMessage::ReadyUp(true), Instant::now()),
            Err(RoomError::Disposed)
        );
    }
}
