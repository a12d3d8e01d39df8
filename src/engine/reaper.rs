use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::engine::Engine;

pub(crate) enum ReaperSignal {
    /// A session was created, the reaper may have parked on an empty registry.
    Wake,
    Shutdown,
}

/// Background thread that periodically removes finished sessions from the engine.
pub(crate) struct Reaper {
    signal_sender: Sender<ReaperSignal>,
    thread: JoinHandle<()>,
}

impl Reaper {
    pub(crate) fn spawn(engine: &'static Engine, interval: Duration) -> Option<Self> {
        let (signal_sender, signal_receiver) = mpsc::channel::<ReaperSignal>();
        let spawned = thread::Builder::new()
            .name("orb-voice-reaper".to_string())
            .spawn(move || run(engine, signal_receiver, interval));
        match spawned {
            Ok(thread) => Some(Self {
                signal_sender,
                thread,
            }),
            Err(e) => {
                error!("failed to spawn reaper thread: {}", e);
                None
            }
        }
    }

    pub(crate) fn wake(&self) {
        let _ = self.signal_sender.send(ReaperSignal::Wake);
    }

    pub(crate) fn shutdown(self) {
        let _ = self.signal_sender.send(ReaperSignal::Shutdown);
        if self.thread.join().is_err() {
            error!("reaper thread panicked");
        }
    }
}

/// Reaps every `interval`. Parks on the channel while there is nothing to reap.
fn run(engine: &'static Engine, signal_receiver: Receiver<ReaperSignal>, interval: Duration) {
    debug!("reaper running every {:?}", interval);
    let mut next_reap = Instant::now() + interval;
    loop {
        let signal = if engine.session_count() == 0 {
            signal_receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            signal_receiver.recv_timeout(next_reap.saturating_duration_since(Instant::now()))
        };
        match signal {
            Ok(ReaperSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(ReaperSignal::Wake) => continue,
            Err(RecvTimeoutError::Timeout) => {
                engine.reap_finished();
                next_reap = Instant::now() + interval;
            }
        }
    }
    debug!("reaper stopped");
}
