use async_trait::async_trait;
use thiserror::Error;

use super::stream::AudioStream;
use crate::{
    common::{StreamError, StreamErrorKind},
    protocol::tracks::Track,
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no source can handle '{0}'")]
    Unsupported(String),

    #[error("upstream refused access: {0}")]
    Forbidden(String),

    #[error("content is restricted: {0}")]
    Restricted(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("unsupported content type: {0}")]
    ContentType(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl SourceError {
    /// How the recovery policy should see this failure.
    pub fn to_stream_error(&self) -> StreamError {
        let kind = match self {
            Self::Forbidden(_) => StreamErrorKind::Forbidden,
            Self::Restricted(_) => StreamErrorKind::Restricted,
            _ => StreamErrorKind::Unavailable,
        };
        StreamError::new(kind, self.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Position the new stream should start at.
    pub seek_ms: Option<u64>,
}

impl ResolveOptions {
    pub fn seek(seek_ms: u64) -> Self {
        Self {
            seek_ms: Some(seek_ms),
        }
    }
}

/// Turns track descriptors into playable streams.
///
/// The session only talks to this trait; [`super::SourceManager`] is the
/// stock implementation on top of [`SourcePlugin`]s.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Open a stream for `track`. `Ok(None)` means the track has no stream.
    async fn resolve(
        &self,
        track: &Track,
        options: ResolveOptions,
    ) -> Result<Option<AudioStream>, SourceError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SourceError>;

    /// Forget anything cached for the track keyed by `track_key` (its url).
    fn invalidate_cache(&self, track_key: &str);

    /// Resolve ahead of time and keep the stream ready. Returns the resolved
    /// descriptor when one is available.
    async fn prewarm(&self, track: &Track) -> Result<Option<String>, SourceError>;
}

/// A single origin (HTTP, a streaming service, local files ...).
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Unique identifier for this source (e.g., "http").
    fn name(&self) -> &str;

    fn can_handle(&self, url: &str) -> bool;

    async fn resolve(
        &self,
        track: &Track,
        options: ResolveOptions,
    ) -> Result<Option<AudioStream>, SourceError>;

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Track>, SourceError> {
        Ok(Vec::new())
    }
}

pub type BoxedSource = Box<dyn SourcePlugin>;
