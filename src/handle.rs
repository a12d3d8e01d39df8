use crate::engine::Engine;
use crate::error::Result;
use crate::session::{SessionId, SessionParams, SessionState};

/// Caller-side handle to a session.
///
/// Holds only the id. Every call looks the session up in the engine's registry, so a handle to a
/// disposed session fails with `UnknownSession` instead of touching stale state. Callers that keep
/// their own list of sessions should keep handles (or ids) and ask the engine for state.
#[derive(Debug, Clone, Copy)]
pub struct SessionHandle<'a> {
    engine: &'a Engine,
    id: SessionId,
}

impl<'a> SessionHandle<'a> {
    pub(crate) fn new(engine: &'a Engine, id: SessionId) -> Self {
        Self { engine, id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn play(&self) -> Result<()> {
        self.engine.play(self.id)
    }

    pub fn pause(&self) -> Result<()> {
        self.engine.pause(self.id)
    }

    pub fn resume(&self) -> Result<()> {
        self.engine.resume(self.id)
    }

    pub fn stop(&self) -> Result<()> {
        self.engine.stop(self.id)
    }

    pub fn set_params(&self, pitch: f32, pan: f32, volume: f32) -> Result<()> {
        self.engine.set_params(self.id, pitch, pan, volume)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.engine.set_volume(self.id, volume)
    }

    pub fn state(&self) -> Result<SessionState> {
        self.engine.state(self.id)
    }

    pub fn params(&self) -> Result<SessionParams> {
        self.engine.params(self.id)
    }

    /// Whether the session is still registered.
    pub fn is_registered(&self) -> bool {
        self.engine.registry().contains(self.id)
    }

    pub fn dispose(self) -> Result<()> {
        self.engine.dispose(self.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::asset::StaticAssetSource;
    use crate::backend::headless::HeadlessBackend;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::error::SoundEngineError;
    use crate::session::SessionState;

    #[test]
    fn handle_drives_its_session() {
        let engine = Engine::new(EngineConfig::default());
        engine.set_backend(Arc::new(HeadlessBackend::default()));
        engine.set_asset_source(StaticAssetSource::new(["x"]));
        let sound = engine.session(engine.create_session("x", 1.0, true).unwrap());

        sound.play().unwrap();
        sound.set_volume(0.5).unwrap();
        sound.pause().unwrap();
        assert_eq!(sound.state().unwrap(), SessionState::Paused);
        sound.resume().unwrap();
        sound.set_params(0.5, 0.25, 1.0).unwrap();
        assert_eq!(sound.params().unwrap().pan, 0.25);
        sound.stop().unwrap();
        sound.stop().unwrap();
        assert!(sound.is_registered());
    }

    #[test]
    fn stale_handle_reports_unknown_session() {
        let engine = Engine::new(EngineConfig::default());
        engine.set_backend(Arc::new(HeadlessBackend::default()));
        engine.set_asset_source(StaticAssetSource::new(["x"]));
        let sound = engine.session(engine.create_session("x", 1.0, false).unwrap());
        let copy = sound;

        sound.dispose().unwrap();
        assert!(!copy.is_registered());
        assert_eq!(copy.play(), Err(SoundEngineError::UnknownSession(copy.id())));
        assert_eq!(copy.state(), Err(SoundEngineError::UnknownSession(copy.id())));
    }
}
