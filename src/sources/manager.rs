use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    http::HttpSource,
    plugin::{BoxedSource, ResolveOptions, SourceError, SourceResolver},
    stream::AudioStream,
};
use crate::{configs::Config, protocol::tracks::Track};

struct CachedStream {
    stream: AudioStream,
    resolved_at: Instant,
}

/// Source Manager
///
/// Dispatches to the first registered plugin that can handle a track url,
/// and keeps streams opened by `prewarm` until they are played or expire.
pub struct SourceManager {
    sources: Vec<BoxedSource>,
    cache: Mutex<HashMap<String, CachedStream>>,
    cache_ttl: Duration,
}

impl SourceManager {
    pub fn new(config: &Config) -> Self {
        let mut manager = Self::empty(Duration::from_millis(config.prefetch.cache_ttl_ms));

        macro_rules! register_source {
            ($enabled:expr, $name:literal, $ctor:expr) => {
                if $enabled {
                    match $ctor {
                        Ok(src) => {
                            tracing::info!("Loaded source: {}", $name);
                            manager.register(Box::new(src));
                        }
                        Err(e) => {
                            tracing::error!("{} source failed to initialize: {}", $name, e);
                        }
                    }
                }
            };
        }

        register_source!(
            config.sources.http,
            "http",
            HttpSource::new(Duration::from_millis(config.sources.request_timeout_ms))
        );

        manager
    }

    pub fn empty(cache_ttl: Duration) -> Self {
        Self {
            sources: Vec::new(),
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    pub fn register(&mut self, source: BoxedSource) {
        self.sources.push(source);
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    fn source_for(&self, url: &str) -> Option<&BoxedSource> {
        self.sources.iter().find(|s| s.can_handle(url))
    }

    fn is_fresh(&self, entry: &CachedStream) -> bool {
        entry.resolved_at.elapsed() < self.cache_ttl && entry.stream.is_readable()
    }

    /// Takes a fresh prewarmed stream for `url`, dropping a stale one.
    fn take_cached(&self, url: &str) -> Option<AudioStream> {
        let mut cache = self.cache.lock();
        let entry = cache.remove(url)?;
        if self.is_fresh(&entry) {
            Some(entry.stream)
        } else {
            tracing::trace!("Discarding stale prewarmed stream for {}", url);
            None
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drops expired or dead prewarmed streams; returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| {
            entry.resolved_at.elapsed() < self.cache_ttl && entry.stream.is_readable()
        });
        before - cache.len()
    }

    /// Periodically sweeps the prewarm cache until `cancel` fires or the
    /// manager is dropped.
    pub fn spawn_cache_sweeper(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        let removed = manager.sweep_expired();
                        if removed > 0 {
                            tracing::debug!("Swept {} expired prewarmed streams", removed);
                        }
                    }
                }
            }
        })
    }

    fn resolve_url<'a>(&self, track: &'a Track) -> &'a str {
        track.prefetch_resolved.as_deref().unwrap_or(&track.url)
    }
}

#[async_trait]
impl SourceResolver for SourceManager {
    async fn resolve(
        &self,
        track: &Track,
        options: ResolveOptions,
    ) -> Result<Option<AudioStream>, SourceError> {
        // Prewarmed streams start at 0, so seeks always open a new one.
        if options.seek_ms.is_none() {
            if let Some(stream) = self.take_cached(&track.url) {
                tracing::debug!("Using prewarmed stream for {}", track.url);
                return Ok(Some(stream));
            }
        }

        let url = self.resolve_url(track);
        let Some(source) = self.source_for(url) else {
            tracing::debug!("No source could handle url: {}", url);
            return Err(SourceError::Unsupported(url.to_string()));
        };

        tracing::trace!("Resolving '{}' with source: {}", url, source.name());
        source.resolve(track, options).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SourceError> {
        let mut results = Vec::new();
        for source in &self.sources {
            if results.len() >= limit {
                break;
            }
            match source.search(query, limit - results.len()).await {
                Ok(found) => results.extend(found),
                Err(e) => tracing::warn!("Search on {} failed: {}", source.name(), e),
            }
        }
        results.truncate(limit);
        Ok(results)
    }

    fn invalidate_cache(&self, track_key: &str) {
        if self.cache.lock().remove(track_key).is_some() {
            tracing::debug!("Invalidated prewarmed stream for {}", track_key);
        }
    }

    async fn prewarm(&self, track: &Track) -> Result<Option<String>, SourceError> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&track.url) {
                if self.is_fresh(entry) {
                    return Ok(Some(entry.stream.descriptor().to_string()));
                }
            }
        }

        let url = self.resolve_url(track);
        let Some(source) = self.source_for(url) else {
            return Err(SourceError::Unsupported(url.to_string()));
        };

        let Some(stream) = source.resolve(track, ResolveOptions::default()).await? else {
            return Ok(None);
        };
        let descriptor = stream.descriptor().to_string();

        self.cache.lock().insert(
            track.url.clone(),
            CachedStream {
                stream,
                resolved_at: Instant::now(),
            },
        );
        Ok(Some(descriptor))
    }
}
