//! Error types for the room server.
//!
//! Only conditions that make a simulation unsafe to continue are errors.
//! Missing bodies, unknown commands and unknown sessions are logged and
//! skipped where they happen.

use crate::physics::BodyId;
use shared::decomp::DecompError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("body {id} has non-finite state after step")]
    NonFinite { id: BodyId },
    #[error("body outline produced no convex parts: {0}")]
    Outline(#[from] DecompError),
}

/// Fatal for the room that raised it; other rooms keep running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoomError {
    #[error("physics failure: {0}")]
    Physics(#[from] PhysicsError),
    #[error("room has been disposed")]
    Disposed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("packet of {size} bytes exceeds the {max} byte limit")]
    PacketTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_error_wraps_physics() {
        let err: RoomError = PhysicsError::NonFinite { id: 4 }.into();
        assert_eq!(err.to_string(), "physics failure: body 4 has non-finite state after step");
    }

    #[test]
    fn test_outline_failure_reaches_room_as_physics() {
        let err: RoomError = PhysicsError::from(DecompError::MaxLevelReached { max_level: 100 }).into();
        assert!(matches!(
            err,
            RoomError::Physics(PhysicsError::Outline(DecompError::MaxLevelReached { .. }))
        ));
        assert!(err.to_string().contains("100"));
    }
}
