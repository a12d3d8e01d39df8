use std::sync::Arc;

use orb_voice::{Engine, HeadlessBackend, SessionState, SoundEngineError, StaticAssetSource};

// Single test: the engine is process-wide and this binary must not share it between tests.
#[test]
fn two_sessions_stopped_together_stay_registered() {
    let backend = Arc::new(HeadlessBackend::default());
    let engine = Engine::instance();
    engine.set_backend(backend.clone());
    engine.set_asset_source(StaticAssetSource::new(["x", "y"]));

    let a = engine.session(engine.create_session("x", 1.0, true).unwrap());
    a.play().unwrap();
    a.pause().unwrap();
    a.resume().unwrap();

    let b = engine.session(engine.create_session("y", 1.0, false).unwrap());
    b.play().unwrap();
    assert_eq!(backend.live_voices(), 2);

    engine.stop_all().unwrap();
    assert_eq!(a.state().unwrap(), SessionState::Stopped);
    assert_eq!(b.state().unwrap(), SessionState::Stopped);
    // stopping is not disposal
    assert!(engine.registry().get(a.id()).is_some());
    assert!(engine.registry().get(b.id()).is_some());
    assert_eq!(backend.live_voices(), 0);

    // terminal parameters are still readable, but no longer writable
    assert!(a.params().unwrap().looping);
    assert!(matches!(
        a.set_params(2.0, -1.0, 0.5),
        Err(SoundEngineError::InvalidState { .. })
    ));

    a.dispose().unwrap();
    assert!(engine.registry().get(a.id()).is_none());
    assert_eq!(a.play(), Err(SoundEngineError::UnknownSession(a.id())));
    assert_eq!(engine.session_ids(), vec![b.id()]);

    engine.teardown();
    assert_eq!(engine.session_count(), 0);
    assert_eq!(b.state(), Err(SoundEngineError::UnknownSession(b.id())));
}
