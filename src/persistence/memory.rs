use async_trait::async_trait;
use dashmap::DashMap;

use super::{PersistenceStore, SessionSnapshot, StoreError};
use crate::common::types::GuildId;

/// Process-local store; sessions survive being dropped and respawned.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: DashMap<GuildId, SessionSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn save(&self, key: &GuildId, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.snapshots.insert(key.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, key: &GuildId) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.snapshots.get(key).map(|entry| entry.value().clone()))
    }

    async fn clear(&self, key: &GuildId) -> Result<(), StoreError> {
        self.snapshots.remove(key);
        Ok(())
    }
}
