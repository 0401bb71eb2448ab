//! Outbound change detection for block poses and the player roster.

use crate::physics::BodySnapshot;
use shared::{
    BlockId, BlockRecord, BlockUpdate, Player, PlayerPatch, BLOCK_UPDATE_BATCH, POSITION_EPSILON,
};
use std::collections::{BTreeMap, HashMap};
use std::f32::consts::TAU;

/// Last broadcast value of each tracked axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

/// Emits per-axis changes that exceed an epsilon since the last broadcast.
///
/// Only axes that were sent take the live value into the cache. An axis
/// creeping by less than epsilon per tick keeps being compared against
/// its last sent value, so it is eventually sent once the total drift
/// crosses the threshold.
#[derive(Debug)]
pub struct DeltaSynchronizer {
    epsilon: f32,
    batch_size: usize,
    last: HashMap<BlockId, BodyPose>,
}

impl Default for DeltaSynchronizer {
    fn default() -> Self {
        Self::new(POSITION_EPSILON, BLOCK_UPDATE_BATCH)
    }
}

impl DeltaSynchronizer {
    pub fn new(epsilon: f32, batch_size: usize) -> Self {
        Self {
            epsilon,
            batch_size: batch_size.max(1),
            last: HashMap::new(),
        }
    }

    /// Starts tracking a block from the pose it was announced with.
    pub fn track(&mut self, block: &BlockRecord) {
        self.last.insert(
            block.id,
            BodyPose {
                x: block.x,
                y: block.y,
                rotation: block.rotation,
            },
        );
    }

    pub fn forget(&mut self, id: BlockId) {
        self.last.remove(&id);
    }

    pub fn last_broadcast(&self, id: BlockId) -> Option<BodyPose> {
        self.last.get(&id).copied()
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }

    /// Compares every live body against the cache. Bodies seen for the
    /// first time are cached without producing an update.
    pub fn compute(&mut self, bodies: &[BodySnapshot]) -> Vec<BlockUpdate> {
        let mut updates = Vec::new();

        for body in bodies {
            let live = BodyPose {
                x: body.position.x,
                y: body.position.y,
                rotation: body.angle,
            };
            let Some(cached) = self.last.get_mut(&body.id) else {
                self.last.insert(body.id, live);
                continue;
            };

            let dx = live.x - cached.x;
            let dy = live.y - cached.y;
            let drot = (live.rotation - cached.rotation) % TAU;

            let mut update = BlockUpdate {
                id: body.id,
                ..Default::default()
            };
            if dx.abs() > self.epsilon {
                update.x = Some(dx);
                cached.x = live.x;
            }
            if dy.abs() > self.epsilon {
                update.y = Some(dy);
                cached.y = live.y;
            }
            if drot.abs() > self.epsilon {
                update.rotation = Some(drot);
                cached.rotation = live.rotation;
            }

            if !update.is_empty() {
                updates.push(update);
            }
        }

        updates
    }

    /// Splits updates into messages of at most `batch_size` records.
    pub fn batches(&self, updates: Vec<BlockUpdate>) -> Vec<Vec<BlockUpdate>> {
        updates
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

/// Diffs the roster against what was last published.
#[derive(Debug, Default)]
pub struct RosterSync {
    published: BTreeMap<String, Player>,
}

impl RosterSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff<'a>(&mut self, current: impl Iterator<Item = &'a Player>) -> Vec<PlayerPatch> {
        let mut patches = Vec::new();
        let mut seen = BTreeMap::new();

        for player in current {
            if self.published.get(&player.user_id) != Some(player) {
                patches.push(PlayerPatch::Upsert(player.clone()));
            }
            seen.insert(player.user_id.clone(), player.clone());
        }

        for user_id in self.published.keys() {
            if !seen.contains_key(user_id) {
                patches.push(PlayerPatch::Remove {
                    user_id: user_id.clone(),
                });
            }
        }

        self.published = seen;
        patches
    }

    /// Full roster as upserts, for a client that just joined.
    pub fn snapshot(&self) -> Vec<PlayerPatch> {
        self.published
            .values()
            .cloned()
            .map(PlayerPatch::Upsert)
            .collect()
    }

    pub fn clear(&mut self) {
        self.published.clear();
    }
}
