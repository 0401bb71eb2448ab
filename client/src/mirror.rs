use log::debug;
use shared::{BlockId, BlockRecord, BlockUpdate, Player, PlayerPatch, RoomMessage};
use std::collections::{BTreeMap, HashMap};

/// Local copy of a room, rebuilt purely from what the server broadcasts.
///
/// There is no prediction: block poses only move when a `block-updates`
/// batch arrives, by adding the per-axis deltas it carries.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub players: BTreeMap<String, Player>,
    pub blocks: HashMap<BlockId, BlockRecord>,
    pub all_ready: bool,
    pub game_started: bool,
    /// Updates that named a block this mirror never saw created.
    pub unknown_updates: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::AllReady(ready) => self.all_ready = ready,
            RoomMessage::GameStarted => self.game_started = true,
            RoomMessage::BlockCreated { block } => {
                debug!(
                    "Block {} ({}) created at ({:.1}, {:.1})",
                    block.id, block.shape_type, block.x, block.y
                );
                self.blocks.insert(block.id, block);
            }
            RoomMessage::BlockUpdates(updates) => {
                for update in &updates {
                    self.apply_update(update);
                }
            }
            RoomMessage::Players(patches) => {
                for patch in patches {
                    self.apply_patch(patch);
                }
            }
        }
    }

    fn apply_update(&mut self, update: &BlockUpdate) {
        let Some(block) = self.blocks.get_mut(&update.id) else {
            self.unknown_updates += 1;
            return;
        };
        if let Some(dx) = update.x {
            block.x += dx;
        }
        if let Some(dy) = update.y {
            block.y += dy;
        }
        if let Some(drot) = update.rotation {
            block.rotation += drot;
        }
    }

    fn apply_patch(&mut self, patch: PlayerPatch) {
        match patch {
            PlayerPatch::Upsert(player) => {
                self.players.insert(player.user_id.clone(), player);
            }
            PlayerPatch::Remove { user_id } => {
                self.players.remove(&user_id);
            }
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockRecord> {
        self.blocks.get(&id)
    }

    pub fn player_by_session(&self, session_id: u32) -> Option<&Player> {
        self.players.values().find(|p| p.session_id == session_id)
    }
}
