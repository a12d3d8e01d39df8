use orb_voice::{DirAssetSource, Engine};
use std::thread;
use std::time::Duration;

fn main() {
    let engine = Engine::instance();
    // try initialize output with default device
    engine.start_output().unwrap();
    engine.set_asset_source(DirAssetSource::new("sounds"));

    let music = engine.session(engine.create_session("test.wav", 1.0, true).unwrap());
    music.play().unwrap();
    thread::sleep(Duration::from_millis(500));
    // pause playback
    music.pause().unwrap();
    thread::sleep(Duration::from_millis(500));
    // resume playback
    music.resume().unwrap();
    thread::sleep(Duration::from_millis(500));
    // pan hard left at half volume, slightly faster
    music.set_params(1.25, -1.0, 0.5).unwrap();
    thread::sleep(Duration::from_millis(500));

    let click = engine.session(engine.create_session("test.wav", 0.5, false).unwrap());
    click.play().unwrap();
    thread::sleep(Duration::from_secs(3));

    engine.stop_all().unwrap();
    engine.reap_finished();
    engine.teardown();
}
