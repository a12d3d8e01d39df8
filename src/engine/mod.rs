use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::asset::AssetSource;
use crate::backend::RenderBackend;
use crate::config::EngineConfig;
use crate::error::{Result, SoundEngineError};
use crate::handle::SessionHandle;
use crate::session::{Session, SessionId, SessionIdGenerator, SessionParams, SessionState};

pub use self::registry::{Registry, SessionRef};
use self::reaper::Reaper;

mod reaper;
mod registry;

/// Process-wide coordinator of playback sessions.
///
/// Owns the [`Registry`], the rendering backend binding and the asset source binding. Sessions
/// are created here and, once created, live in the registry until [`Engine::dispose`],
/// [`Engine::reap_finished`] or [`Engine::teardown`] removes them.
///
/// A removed session whose voice could not be stopped or released is parked until
/// [`Engine::reap_finished`] or [`Engine::teardown`] manages to release it.
pub struct Engine {
    config: RwLock<EngineConfig>,
    registry: Registry,
    unreleased: Mutex<Vec<SessionRef>>,
    ids: SessionIdGenerator,
    assets: RwLock<Option<Arc<dyn AssetSource>>>,
    backend: RwLock<Option<Arc<dyn RenderBackend>>>,
    reaper: Mutex<Option<Reaper>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &*self.config.read())
            .field("sessions", &self.registry.len())
            .field("unreleased", &self.unreleased.lock().len())
            .field("has_backend", &self.backend.read().is_some())
            .field("has_assets", &self.assets.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Returns the process-wide engine, constructing it on first use.
    pub fn instance() -> &'static Engine {
        static ENGINE: OnceLock<Engine> = OnceLock::new();
        ENGINE.get_or_init(|| {
            info!("session engine created");
            Engine::new(EngineConfig::default())
        })
    }

    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config: RwLock::new(config),
            registry: Registry::new(),
            unreleased: Mutex::new(Vec::new()),
            ids: SessionIdGenerator::new(),
            assets: RwLock::new(None),
            backend: RwLock::new(None),
            reaper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration and starts, restarts or stops the background reaper to match.
    pub fn configure(&'static self, config: EngineConfig) {
        let interval = config.reap_interval();
        *self.config.write() = config;
        self.stop_reaper();
        if let Some(interval) = interval {
            *self.reaper.lock() = Reaper::spawn(self, interval);
        }
        info!("engine configured, reaper interval {:?}", interval);
    }

    /// Binds the asset source used by sessions created from now on. Last write wins.
    pub fn set_asset_source<S>(&self, source: S)
    where
        S: AssetSource + 'static,
    {
        *self.assets.write() = Some(Arc::new(source));
        info!("asset source bound");
    }

    /// Binds the rendering backend used by sessions created from now on. Existing sessions keep
    /// the backend they were created with.
    pub fn set_backend(&self, backend: Arc<dyn RenderBackend>) {
        *self.backend.write() = Some(backend);
        info!("rendering backend bound");
    }

    /// Starts audible output on the default device and binds it as the backend.
    #[cfg(feature = "rodio-output")]
    pub fn start_output(&self) -> Result<()> {
        let backend = crate::backend::output::RodioBackend::start(&self.config())?;
        self.set_backend(Arc::new(backend));
        Ok(())
    }

    /// Creates a session for `path` and registers it. A session whose initialization fails is
    /// discarded without ever being registered.
    pub fn create_session(&self, path: &str, volume: f32, looping: bool) -> Result<SessionId> {
        let backend = self.backend.read().clone().ok_or_else(|| {
            SoundEngineError::BackendUnavailable("no rendering backend bound".to_string())
        })?;
        let assets = self
            .assets
            .read()
            .clone()
            .ok_or_else(|| SoundEngineError::AssetNotFound {
                path: PathBuf::from(path),
            })?;

        let mut session = Session::new(backend);
        let id = session.init(self.ids.next(), assets.as_ref(), path, volume, looping)?;
        self.registry.insert(session)?;
        if let Some(reaper) = self.reaper.lock().as_ref() {
            reaper.wake();
        }
        debug!("session {} created for {}", id, path);
        Ok(id)
    }

    /// Caller-side handle to a session. The handle only stores the id; every call resolves it
    /// through the registry again.
    pub fn session(&self, id: SessionId) -> SessionHandle<'_> {
        SessionHandle::new(self, id)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn play(&self, id: SessionId) -> Result<()> {
        self.with_session(id, Session::play)
    }

    pub fn pause(&self, id: SessionId) -> Result<()> {
        self.with_session(id, Session::pause)
    }

    pub fn resume(&self, id: SessionId) -> Result<()> {
        self.with_session(id, Session::resume)
    }

    pub fn stop(&self, id: SessionId) -> Result<()> {
        self.with_session(id, Session::stop)
    }

    pub fn set_params(&self, id: SessionId, pitch: f32, pan: f32, volume: f32) -> Result<()> {
        self.with_session(id, |session| session.set_params(pitch, pan, volume))
    }

    pub fn set_volume(&self, id: SessionId, volume: f32) -> Result<()> {
        self.with_session(id, |session| session.set_volume(volume))
    }

    pub fn state(&self, id: SessionId) -> Result<SessionState> {
        self.with_session(id, |session| Ok(session.state()))
    }

    pub fn params(&self, id: SessionId) -> Result<SessionParams> {
        self.with_session(id, |session| Ok(session.params()))
    }

    /// Removes a session from the registry, stopping it first if it is still live.
    ///
    /// The session is gone from the registry even if stopping it fails. The error is returned
    /// and the session is parked until a later [`Engine::reap_finished`] or
    /// [`Engine::teardown`] stops and releases it.
    pub fn dispose(&self, id: SessionId) -> Result<()> {
        let session = self
            .registry
            .remove(id)
            .ok_or(SoundEngineError::UnknownSession(id))?;
        let result = session.lock().stop();
        if result.is_err() {
            self.park(session);
        }
        debug!("session {} disposed", id);
        result
    }

    /// Number of removed sessions still waiting for their voice to be released.
    pub fn unreleased_count(&self) -> usize {
        self.unreleased.lock().len()
    }

    /// Stops every registered session. Stopped sessions are skipped unless their voice release
    /// is still pending, in which case the release is retried.
    pub fn stop_all(&self) -> Result<()> {
        self.fan_out("stop_all", |session| match session.state() {
            SessionState::Stopped if !session.release_pending() => None,
            _ => Some(session.stop()),
        })
    }

    /// Pauses every playing session. Sessions in any other state are skipped.
    pub fn pause_all(&self) -> Result<()> {
        self.fan_out("pause_all", |session| match session.state() {
            SessionState::Playing => Some(session.pause()),
            _ => None,
        })
    }

    /// Resumes every paused session. Sessions in any other state are skipped.
    pub fn resume_all(&self) -> Result<()> {
        self.fan_out("resume_all", |session| match session.state() {
            SessionState::Paused => Some(session.resume()),
            _ => None,
        })
    }

    /// Removes every stopped session and every non-looping session that played to the end,
    /// once its voice is released. Returns the ids that were removed. Parked sessions are
    /// retried as well.
    pub fn reap_finished(&self) -> Vec<SessionId> {
        let mut finished = Vec::new();
        self.registry.for_each(|id, session| {
            if session.state() == SessionState::Stopped || session.is_finished() {
                match session.stop() {
                    Ok(()) => finished.push(id),
                    Err(e) => warn!("failed to stop finished session {}: {}", id, e),
                }
            }
        });
        finished.retain(|id| self.registry.remove(*id).is_some());
        let released = self.release_parked();
        if !finished.is_empty() || released > 0 {
            debug!(
                "reaped {} sessions, released {} parked",
                finished.len(),
                released
            );
        }
        finished
    }

    /// Stops and disposes every session, shuts the reaper down and unbinds backend and asset
    /// source. Sessions that fail to stop are parked, see [`Engine::unreleased_count`]. Ids
    /// keep increasing afterwards; the engine can be bound and used again.
    pub fn teardown(&self) {
        self.stop_reaper();
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            let stopped = session.lock().stop();
            if let Err(e) = stopped {
                warn!("teardown failed to stop session {:?}: {}", session.lock().id(), e);
                self.park(session);
            }
        }
        self.release_parked();
        *self.backend.write() = None;
        *self.assets.write() = None;
        info!("engine torn down, {} sessions disposed", count);
    }

    fn park(&self, session: SessionRef) {
        self.unreleased.lock().push(session);
    }

    /// Retries stopping every parked session. Returns how many were released.
    fn release_parked(&self) -> usize {
        let parked = std::mem::take(&mut *self.unreleased.lock());
        let total = parked.len();
        let mut still_held = Vec::new();
        for session in parked {
            let stopped = session.lock().stop();
            match stopped {
                Ok(()) => debug!("released parked session {:?}", session.lock().id()),
                Err(e) => {
                    warn!("parked session {:?} still held: {}", session.lock().id(), e);
                    still_held.push(session);
                }
            }
        }
        let released = total - still_held.len();
        self.unreleased.lock().extend(still_held);
        released
    }

    fn with_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> Result<R>,
    ) -> Result<R> {
        let session = self
            .registry
            .get(id)
            .ok_or(SoundEngineError::UnknownSession(id))?;
        let mut guard = session.lock();
        f(&mut guard)
    }

    /// Applies `apply` to every session under the registry walk. `apply` returns `None` for a
    /// skipped session. Failures do not stop the walk; the first one is returned.
    fn fan_out<F>(&self, operation: &'static str, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut Session) -> Option<Result<()>>,
    {
        let mut first_error = None;
        let (mut applied, mut skipped, mut failed) = (0usize, 0usize, 0usize);
        self.registry.for_each(|id, session| match apply(session) {
            None => skipped += 1,
            Some(Ok(())) => applied += 1,
            Some(Err(e)) => {
                warn!("{} failed for session {}: {}", operation, id, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        });
        debug!(
            "{}: {} applied, {} skipped, {} failed",
            operation, applied, skipped, failed
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop_reaper(&self) {
        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.shutdown();
        }
    }
}
