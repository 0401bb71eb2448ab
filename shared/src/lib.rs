use serde::{Deserialize, Serialize};

pub mod decomp;
pub mod geometry;
pub mod shapes;

pub use shapes::ShapeType;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 4096;

// Arena layout. Lanes run left to right, one per ready player.
pub const LANE_START_X: f32 = 75.0;
pub const LANE_SPACING: f32 = 200.0;
pub const FLOOR_Y: f32 = 300.0;
pub const FLOOR_WIDTH: f32 = 100.0;
pub const FLOOR_HEIGHT: f32 = 20.0;
pub const WALL_Y: f32 = 200.0;
pub const WALL_WIDTH: f32 = 10.0;
pub const WALL_HEIGHT: f32 = 200.0;
/// Offset of the separating wall to the right of each lane.
pub const WALL_OFFSET: f32 = 100.0;
/// Offset of the single boundary wall left of the first lane.
pub const BOUNDARY_WALL_OFFSET: f32 = -100.0;
pub const SPAWN_Y: f32 = 0.0;

/// Bodies below this line are removed from the world.
pub const FLOOR_THRESHOLD: f32 = 500.0;
pub const POSITION_EPSILON: f32 = 0.001;
pub const BLOCK_UPDATE_BATCH: usize = 20;

pub type SessionId = u32;
pub type BlockId = u32;

/// Identity fields a client supplies when joining a room.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_ref: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub session_id: SessionId,
    pub user_id: String,
    pub display_name: String,
    pub avatar_ref: String,
    pub ready: bool,
    pub x: f32,
    pub y: f32,
}

impl Player {
    pub fn new(session_id: SessionId, profile: PlayerProfile) -> Self {
        Self {
            session_id,
            user_id: profile.user_id,
            display_name: profile.display_name,
            avatar_ref: profile.avatar_ref,
            ready: false,
            x: 0.0,
            y: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlockRecord {
    pub id: BlockId,
    pub shape_type: ShapeType,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub colour: String,
}

/// Partial update for one body. Present axes carry the change since the
/// previous broadcast of that axis, not absolute values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BlockUpdate {
    pub id: BlockId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub rotation: Option<f32>,
}

impl BlockUpdate {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.rotation.is_none()
    }
}

/// One change to the replicated roster.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PlayerPatch {
    Upsert(Player),
    Remove { user_id: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientMessage {
    ReadyUp(bool),
    StartGameRequested,
    PlayerInput(String),
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::ReadyUp(_) => "ready-up",
            ClientMessage::StartGameRequested => "start-game-requested",
            ClientMessage::PlayerInput(_) => "player-input",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum RoomMessage {
    AllReady(bool),
    GameStarted,
    BlockCreated { block: BlockRecord },
    BlockUpdates(Vec<BlockUpdate>),
    Players(Vec<PlayerPatch>),
}

impl RoomMessage {
    pub fn name(&self) -> &'static str {
        match self {
            RoomMessage::AllReady(_) => "all_ready",
            RoomMessage::GameStarted => "game-started",
            RoomMessage::BlockCreated { .. } => "block-created",
            RoomMessage::BlockUpdates(_) => "block-updates",
            RoomMessage::Players(_) => "players",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        client_version: u32,
        room: String,
        profile: PlayerProfile,
    },
    Leave,
    Heartbeat,
    Client(ClientMessage),

    Joined {
        session_id: SessionId,
    },
    Rejected {
        reason: String,
    },
    Disconnected {
        reason: String,
    },
    Room(RoomMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PlayerProfile {
        PlayerProfile {
            user_id: "u-1".to_string(),
            display_name: "Alice".to_string(),
            avatar_ref: "avatars/1.png".to_string(),
        }
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new(7, profile());
        assert_eq!(player.session_id, 7);
        assert_eq!(player.user_id, "u-1");
        assert_eq!(player.display_name, "Alice");
        assert!(!player.ready);
    }

    #[test]
    fn test_message_names() {
        assert_eq!(ClientMessage::ReadyUp(true).name(), "ready-up");
        assert_eq!(
            ClientMessage::StartGameRequested.name(),
            "start-game-requested"
        );
        assert_eq!(RoomMessage::AllReady(false).name(), "all_ready");
        assert_eq!(RoomMessage::GameStarted.name(), "game-started");
        assert_eq!(RoomMessage::BlockUpdates(vec![]).name(), "block-updates");
    }

    #[test]
    fn test_block_update_is_empty() {
        let mut update = BlockUpdate {
            id: 3,
            ..Default::default()
        };
        assert!(update.is_empty());
        update.rotation = Some(0.5);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::Join {
            client_version: PROTOCOL_VERSION,
            room: "lobby".to_string(),
            profile: profile(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Join {
                client_version,
                room,
                profile,
            } => {
                assert_eq!(client_version, PROTOCOL_VERSION);
                assert_eq!(room, "lobby");
                assert_eq!(profile.user_id, "u-1");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_full_update_batch_fits_in_datagram() {
        let updates = (0..BLOCK_UPDATE_BATCH as u32)
            .map(|id| BlockUpdate {
                id,
                x: Some(1.0),
                y: Some(2.0),
                rotation: Some(3.0),
            })
            .collect();
        let packet = Packet::Room(RoomMessage::BlockUpdates(updates));
        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() <= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_block_created_serialization() {
        let block = BlockRecord {
            id: 12,
            shape_type: ShapeType::Z,
            x: 75.0,
            y: 0.0,
            rotation: std::f32::consts::PI,
            colour: "cyan".to_string(),
        };
        let packet = Packet::Room(RoomMessage::BlockCreated {
            block: block.clone(),
        });
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, Packet::Room(RoomMessage::BlockCreated { block }));
    }
}
