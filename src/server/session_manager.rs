use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    common::types::GuildId,
    configs::Config,
    persistence::PersistenceStore,
    player::{PlayerHandle, PlayerServices},
    recommend::Recommender,
    sources::SourceManager,
    voice::TransportFactory,
};

/// Registry of live player sessions, one per guild.
pub struct SessionManager {
    config: Arc<Config>,
    services: PlayerServices,
    players: DashMap<GuildId, PlayerHandle>,
    background: CancellationToken,
}

impl SessionManager {
    pub fn new(config: Arc<Config>, services: PlayerServices) -> Self {
        Self {
            config,
            services,
            players: DashMap::new(),
            background: CancellationToken::new(),
        }
    }

    /// Sessions resolving through `sources`. Its prewarm cache is swept
    /// once per cache TTL until the registry is dropped. Must be called
    /// inside a tokio runtime.
    pub fn with_sources(
        config: Arc<Config>,
        sources: Arc<SourceManager>,
        transports: Arc<dyn TransportFactory>,
        recommender: Option<Arc<dyn Recommender>>,
        store: Option<Arc<dyn PersistenceStore>>,
    ) -> Self {
        let manager = Self::new(
            config,
            PlayerServices {
                resolver: sources.clone(),
                transports,
                recommender,
                store,
            },
        );
        let every = sources.cache_ttl().max(Duration::from_secs(1));
        let _ = sources.spawn_cache_sweeper(every, manager.background.child_token());
        info!("Sweeping source cache every {}s", every.as_secs());
        manager
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The live session for `guild_id`, if any.
    pub fn get(&self, guild_id: &GuildId) -> Option<PlayerHandle> {
        self.players
            .get(guild_id)
            .filter(|entry| !entry.is_closed())
            .map(|entry| entry.value().clone())
    }

    /// Returns the session for `guild_id`, spawning one (and restoring its
    /// saved state) when none is running.
    pub fn get_or_create(&self, guild_id: &GuildId) -> PlayerHandle {
        let mut entry = self
            .players
            .entry(guild_id.clone())
            .or_insert_with(|| self.spawn(guild_id));

        if entry.is_closed() {
            info!("[{}] replacing closed player session", guild_id);
            *entry = self.spawn(guild_id);
        }
        entry.value().clone()
    }

    fn spawn(&self, guild_id: &GuildId) -> PlayerHandle {
        info!("[{}] creating player session", guild_id);
        PlayerHandle::spawn(guild_id.clone(), self.config.clone(), &self.services)
    }

    /// Shuts the session down and forgets it. Returns false if there was
    /// none.
    pub fn remove(&self, guild_id: &GuildId) -> bool {
        match self.players.remove(guild_id) {
            Some((_, handle)) => {
                handle.shutdown();
                info!("[{}] player session removed", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.players.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn shutdown_all(&self) {
        if self.players.is_empty() {
            return;
        }
        info!("Shutting down {} player session(s)", self.players.len());
        for entry in self.players.iter() {
            entry.value().shutdown();
        }
        self.players.clear();
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.background.cancel();
        self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use crate::sources::plugin::SourceResolver;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;

    use super::*;
    use crate::{
        common::{StreamError, types::StreamToken},
        persistence::{MemoryStore, PersistenceStore},
        protocol::tracks::Track,
        sources::{AudioStream, ResolveOptions, SourceError, SourceManager, SourcePlugin},
        voice::{TransportEvent, TransportFactory, VoiceTransport},
    };

    struct EchoSource;

    #[async_trait]
    impl SourcePlugin for EchoSource {
        fn name(&self) -> &str {
            "echo"
        }

        fn can_handle(&self, _url: &str) -> bool {
            true
        }

        async fn resolve(
            &self,
            track: &Track,
            _options: ResolveOptions,
        ) -> Result<Option<AudioStream>, SourceError> {
            Ok(Some(AudioStream::new(track.url.clone(), futures::stream::empty())))
        }
    }

    struct NullTransport;

    #[async_trait]
    impl VoiceTransport for NullTransport {
        async fn play(&self, _: StreamToken, _: AudioStream, _: f32) -> Result<(), StreamError> {
            Ok(())
        }

        fn stop(&self, _force_flush: bool) {}

        fn pause(&self) -> bool {
            true
        }

        fn unpause(&self) -> bool {
            true
        }

        fn set_volume(&self, _volume: f32) {}
    }

    struct NullFactory;

    impl TransportFactory for NullFactory {
        fn create(
            &self,
            _guild_id: &GuildId,
            _events: UnboundedSender<TransportEvent>,
        ) -> Arc<dyn VoiceTransport> {
            Arc::new(NullTransport)
        }
    }

    fn manager(store: Arc<MemoryStore>) -> SessionManager {
        let services = PlayerServices {
            resolver: Arc::new(SourceManager::empty(Duration::from_secs(60))),
            transports: Arc::new(NullFactory),
            recommender: None,
            store: Some(store as Arc<dyn PersistenceStore>),
        };
        SessionManager::new(Arc::new(Config::default()), services)
    }

    async fn wait_closed(handle: &PlayerHandle) {
        for _ in 0..100 {
            if handle.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not close");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_reuses_live_session() {
        let sessions = manager(Arc::new(MemoryStore::new()));
        let guild = GuildId::from("1");

        assert!(sessions.get(&guild).is_none());
        let first = sessions.get_or_create(&guild);
        first.set_volume(25).await.unwrap();

        let second = sessions.get_or_create(&guild);
        assert_eq!(second.queue_info().await.unwrap().volume, 25);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.guild_ids(), vec![guild]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_is_replaced_and_restored() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone());
        let guild = GuildId::from("2");

        let first = sessions.get_or_create(&guild);
        first.set_volume(35).await.unwrap();
        first.shutdown();
        wait_closed(&first).await;
        assert!(sessions.get(&guild).is_none());

        let second = sessions.get_or_create(&guild);
        assert!(!second.is_closed());
        assert_eq!(second.queue_info().await.unwrap().volume, 35);
        assert!(store.load(&guild).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_shutdown_all() {
        let sessions = manager(Arc::new(MemoryStore::new()));
        let a = sessions.get_or_create(&GuildId::from("a"));
        let b = sessions.get_or_create(&GuildId::from("b"));

        assert!(sessions.remove(&GuildId::from("a")));
        assert!(!sessions.remove(&GuildId::from("a")));
        wait_closed(&a).await;

        sessions.shutdown_all();
        assert!(sessions.is_empty());
        wait_closed(&b).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_sources_sweeps_expired_prewarms() {
        let mut sources = SourceManager::empty(Duration::from_secs(60));
        sources.register(Box::new(EchoSource));
        let sources = Arc::new(sources);
        let sessions = SessionManager::with_sources(
            Arc::new(Config::default()),
            sources.clone(),
            Arc::new(NullFactory),
            None,
            None,
        );

        sources
            .prewarm(&Track::new("https://audio.test/a.mp3", "A", "Artist"))
            .await
            .unwrap();
        assert_eq!(sources.cached_len(), 1);

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(sources.cached_len(), 0);

        let session = sessions.get_or_create(&GuildId::from("s"));
        assert!(session.search("a", 1).await.unwrap().is_empty());
    }
}
