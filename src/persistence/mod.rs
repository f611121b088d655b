use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{common::types::GuildId, player::LoopMode, protocol::tracks::Track};

pub mod file;
pub mod memory;
pub mod throttle;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use throttle::{SaveDecision, SaveThrottle};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable part of a session: enough to rebuild the queue after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub queue: Vec<Track>,
    pub cursor: Option<usize>,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub auto_continuation: bool,
}

impl SessionSnapshot {
    /// Cursor pointing into the stored queue, or `None` if it no longer does.
    pub fn valid_cursor(&self) -> Option<usize> {
        self.cursor.filter(|&i| i < self.queue.len())
    }
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn save(&self, key: &GuildId, snapshot: &SessionSnapshot) -> Result<(), StoreError>;

    async fn load(&self, key: &GuildId) -> Result<Option<SessionSnapshot>, StoreError>;

    async fn clear(&self, key: &GuildId) -> Result<(), StoreError>;
}
