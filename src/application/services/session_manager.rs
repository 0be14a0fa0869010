use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::application::ports::{Engine, EngineConfig, EngineError};
use crate::domain::{LanguageTag, PcmAudio, RawPcmFormat, SessionId, SessionState};

use super::engine_call::bounded;
use super::{EnginePlugin, LanguageRouter};

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
    pub call_timeout: Option<Duration>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(30),
            call_timeout: None,
        }
    }
}

/// Outcome of a streaming operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub id: SessionId,
    pub lang: LanguageTag,
    pub transcript: String,
}

struct Session {
    lang: LanguageTag,
    state: SessionState,
    engine: Option<Engine>,
    /// Raw PCM collected for engines that cannot stream.
    buffer: Vec<u8>,
    chunks: usize,
}

impl Session {
    fn new(lang: LanguageTag) -> Self {
        Self {
            lang,
            state: SessionState::Idle,
            engine: None,
            buffer: Vec::new(),
            chunks: 0,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
    }
}

struct SessionEntry {
    session: tokio::sync::Mutex<Session>,
    last_activity: Mutex<Instant>,
}

impl SessionEntry {
    fn new(lang: LanguageTag) -> Self {
        Self {
            session: tokio::sync::Mutex::new(Session::new(lang)),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.lock().elapsed() > timeout
    }
}

/// Streaming recognition sessions, each with an engine of its own.
///
/// Operations on one session run in arrival order behind that session's lock;
/// different sessions never wait on each other.
pub struct SessionManager {
    plugin: EnginePlugin,
    base_config: EngineConfig,
    router: Arc<LanguageRouter>,
    config: SessionManagerConfig,
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new(
        plugin: EnginePlugin,
        base_config: EngineConfig,
        router: Arc<LanguageRouter>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            plugin,
            base_config,
            router,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn stream_format(&self) -> RawPcmFormat {
        self.base_config.stream_format
    }

    /// Opens `id`, or reuses it when already open.
    pub async fn start(
        &self,
        id: &SessionId,
        lang: &LanguageTag,
    ) -> Result<StreamUpdate, SessionError> {
        loop {
            let entry = self.get_or_insert(id, lang).await?;
            entry.touch();

            let mut session = entry.session.lock().await;
            match session.state {
                SessionState::Idle => {
                    if let Err(e) = self.open(&mut session).await {
                        session.transition(SessionState::Stopped);
                        drop(session);
                        self.remove_entry(id, &entry);
                        tracing::error!(session = %id, error = %e, "Failed to start session");
                        return Err(SessionError::EngineInit(e));
                    }
                    tracing::info!(
                        session = %id,
                        lang = %session.lang,
                        native = session.engine.as_ref().is_some_and(Engine::can_stream),
                        "Session started"
                    );
                }
                SessionState::Started | SessionState::Streaming => {
                    if session.lang != *lang {
                        tracing::debug!(
                            session = %id,
                            lang = %session.lang,
                            requested = %lang,
                            "Session already open, keeping its language"
                        );
                    }
                }
                // Stopped between lookup and lock; the entry is gone from the table.
                SessionState::Stopped => continue,
            }

            return Ok(StreamUpdate {
                id: id.clone(),
                lang: session.lang.clone(),
                transcript: String::new(),
            });
        }
    }

    /// Forwards a raw PCM chunk. Returns the partial transcript, always empty for buffered sessions.
    pub async fn feed(&self, id: &SessionId, chunk: &[u8]) -> Result<StreamUpdate, SessionError> {
        let entry = self.lookup(id)?;
        entry.touch();

        let mut guard = entry.session.lock().await;
        let session = &mut *guard;
        if !session.state.is_open() {
            return Err(SessionError::SessionNotFound(id.clone()));
        }

        let transcript = match session.engine.as_mut() {
            Some(Engine::Streaming(engine)) => {
                match bounded(self.config.call_timeout, engine.stream_data(chunk)).await {
                    Ok(partial) => partial,
                    Err(e) => {
                        tracing::error!(session = %id, error = %e, "Streaming recognition failed");
                        String::new()
                    }
                }
            }
            Some(Engine::BatchOnly(_)) => {
                session.buffer.extend_from_slice(chunk);
                String::new()
            }
            None => return Err(SessionError::SessionNotFound(id.clone())),
        };

        session.transition(SessionState::Streaming);
        session.chunks += 1;

        tracing::debug!(
            session = %id,
            bytes = chunk.len(),
            chunks = session.chunks,
            buffered = session.buffer.len(),
            "Audio chunk received"
        );

        Ok(StreamUpdate {
            id: id.clone(),
            lang: session.lang.clone(),
            transcript,
        })
    }

    /// Produces the final transcript and removes the session, whether or not recognition succeeded.
    pub async fn stop(&self, id: &SessionId) -> Result<StreamUpdate, SessionError> {
        let entry = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))?;

        let mut session = entry.session.lock().await;
        if !session.state.is_open() {
            return Err(SessionError::SessionNotFound(id.clone()));
        }
        session.transition(SessionState::Stopped);

        let engine = session.engine.take();
        let buffer = std::mem::take(&mut session.buffer);
        let lang = session.lang.clone();
        let chunks = session.chunks;
        drop(session);

        let (transcript, lang) = match engine {
            Some(engine) => self.finish(id, engine, buffer, lang).await,
            None => (String::new(), lang),
        };

        tracing::info!(
            session = %id,
            lang = %lang,
            chunks = chunks,
            chars = transcript.len(),
            "Session stopped"
        );

        Ok(StreamUpdate {
            id: id.clone(),
            lang,
            transcript,
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Closes sessions idle for longer than the configured timeout.
    pub async fn cleanup_expired(&self) -> usize {
        let expired = {
            let mut sessions = self.sessions.write();
            Self::take_expired(&mut sessions, self.config.idle_timeout)
        };

        let count = expired.len();
        for (id, entry) in expired {
            self.abandon(&id, &entry).await;
        }
        count
    }

    /// Runs [`cleanup_expired`](Self::cleanup_expired) periodically until `true` is sent.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = manager.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.cleanup_expired().await;
                        if removed > 0 {
                            tracing::info!(
                                removed = removed,
                                remaining = manager.session_count(),
                                "Idle sessions reaped"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn get_or_insert(
        &self,
        id: &SessionId,
        lang: &LanguageTag,
    ) -> Result<Arc<SessionEntry>, SessionError> {
        let (entry, reaped) = {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(id) {
                return Ok(Arc::clone(existing));
            }

            let mut reaped = Vec::new();
            if sessions.len() >= self.config.max_sessions {
                reaped = Self::take_expired(&mut sessions, self.config.idle_timeout);
            }

            if sessions.len() >= self.config.max_sessions {
                (None, reaped)
            } else {
                let entry = Arc::new(SessionEntry::new(lang.clone()));
                sessions.insert(id.clone(), Arc::clone(&entry));
                (Some(entry), reaped)
            }
        };

        for (reaped_id, reaped_entry) in reaped {
            self.abandon(&reaped_id, &reaped_entry).await;
        }

        entry.ok_or(SessionError::SessionLimitReached(self.config.max_sessions))
    }

    fn lookup(&self, id: &SessionId) -> Result<Arc<SessionEntry>, SessionError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))
    }

    fn remove_entry(&self, id: &SessionId, entry: &Arc<SessionEntry>) {
        let mut sessions = self.sessions.write();
        if sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            sessions.remove(id);
        }
    }

    fn take_expired(
        sessions: &mut HashMap<SessionId, Arc<SessionEntry>>,
        timeout: Duration,
    ) -> Vec<(SessionId, Arc<SessionEntry>)> {
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    async fn open(&self, session: &mut Session) -> Result<(), EngineError> {
        let mut config = self.base_config.clone();
        config.lang = session.lang.clone();

        let mut engine = self.plugin.instantiate(config).await?;
        if let Engine::Streaming(streaming) = &mut engine {
            bounded(self.config.call_timeout, streaming.stream_start()).await?;
        }

        session.engine = Some(engine);
        session.buffer.clear();
        session.transition(SessionState::Started);
        Ok(())
    }

    async fn finish(
        &self,
        id: &SessionId,
        engine: Engine,
        buffer: Vec<u8>,
        lang: LanguageTag,
    ) -> (String, LanguageTag) {
        match engine {
            Engine::Streaming(mut streaming) => {
                match bounded(self.config.call_timeout, streaming.stream_stop()).await {
                    Ok(text) => (text, lang),
                    Err(e) => {
                        tracing::error!(session = %id, error = %e, "Final streaming recognition failed");
                        (String::new(), lang)
                    }
                }
            }
            engine @ Engine::BatchOnly(_) => {
                let audio = PcmAudio::from_pcm16_le(&buffer, self.base_config.stream_format);
                if audio.is_empty() {
                    tracing::debug!(session = %id, "Session ended without audio");
                    return (String::new(), lang);
                }

                let lang = if lang.is_auto() {
                    self.router.resolve_auto(&audio, Some(&engine)).await
                } else {
                    lang
                };

                match bounded(self.config.call_timeout, engine.execute(&audio, &lang)).await {
                    Ok(text) => (text, lang),
                    Err(e) => {
                        tracing::error!(session = %id, error = %e, "Buffered recognition failed");
                        (String::new(), lang)
                    }
                }
            }
        }
    }

    async fn abandon(&self, id: &SessionId, entry: &SessionEntry) {
        let mut session = entry.session.lock().await;
        if !session.state.is_open() {
            return;
        }
        session.transition(SessionState::Stopped);
        session.buffer.clear();

        if let Some(Engine::Streaming(mut streaming)) = session.engine.take() {
            if let Err(e) = bounded(self.config.call_timeout, streaming.stream_stop()).await {
                tracing::warn!(session = %id, error = %e, "Failed to stop abandoned stream");
            }
        }

        tracing::info!(session = %id, "Expired idle session");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("session limit reached ({0} active)")]
    SessionLimitReached(usize),
    #[error("engine unavailable: {0}")]
    EngineInit(EngineError),
}
