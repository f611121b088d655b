use async_trait::async_trait;
use thiserror::Error;

use crate::{common::types::GuildId, protocol::tracks::Track};

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("recommendation backend failed: {0}")]
    Backend(String),

    #[error("no seed track available")]
    NoSeed,
}

/// What the session tells the generator about the request.
#[derive(Debug, Clone, Default)]
pub struct RecommendationContext {
    pub guild_id: GuildId,
    /// 1-based attempt number; above 1 the previous answer was a duplicate.
    pub attempt: u32,
    /// Fingerprints of everything queued or recently played.
    pub excluded: Vec<String>,
}

/// Produces the next track to play once the queue runs dry.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn next_recommendation(
        &self,
        seed: &Track,
        history: &[Track],
        context: &RecommendationContext,
    ) -> Result<Option<Track>, RecommendError>;
}
