//! Allocator configuration.

use crate::error::RoomError;

/// Per-room capacity used when nothing else is configured.
pub const DEFAULT_MAX_USERS: usize = 5;

/// Room allocation settings, fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Maximum number of members a single room may hold
    pub max_users: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_users: DEFAULT_MAX_USERS,
        }
    }
}

impl RoomConfig {
    /// Create a config with the given capacity.
    ///
    /// A capacity of zero could never admit anyone and is rejected.
    pub fn new(max_users: usize) -> Result<Self, RoomError> {
        if max_users == 0 {
            return Err(RoomError::InvalidCapacity);
        }
        Ok(Self { max_users })
    }
}
