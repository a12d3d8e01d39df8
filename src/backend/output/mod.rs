//! Audible output through the default device.
//!
//! A dedicated render thread owns the `rodio` output stream and one sink per voice, runs an
//! event loop that applies incoming [`VoiceCommand`]s and keeps each voice's ring buffer filled
//! from its decoder. Control threads only talk to it through the command channel and the
//! per-voice [`VoiceShared`] atomics, which carry volume, pan and pitch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, error, info, warn};

use crate::asset::AssetHandle;
use crate::backend::{RenderBackend, VoiceHandle, VoiceParams, VoiceState};
use crate::command::{AllocateVoice, VoiceCommand};
use crate::config::EngineConfig;
use crate::error::{Result, SoundEngineError};

use self::sound::{FileDecoder, OrbSound};
pub(crate) use self::sound::VoiceShared;

pub(crate) mod sound;

/// Pause between two passes of the render loop.
const FILL_INTERVAL: Duration = Duration::from_millis(5);

/// Rendering backend playing through the default output device.
pub struct RodioBackend {
    command_sender: Mutex<Sender<VoiceCommand>>,
    voices: Mutex<HashMap<VoiceHandle, Arc<VoiceShared>>>,
    next_voice: AtomicU64,
    max_voices: usize,
    render_thread: Mutex<Option<JoinHandle<()>>>,
}

impl RodioBackend {
    /// Opens the default output device on a new render thread. Returns once the device is
    /// ready, or with the error that prevented it.
    pub fn start(config: &EngineConfig) -> Result<Self> {
        let (command_sender, command_receiver) = mpsc::channel::<VoiceCommand>();
        let (err_sender, err_receiver) = mpsc::channel::<Option<SoundEngineError>>();
        let buffer_ms = config.buffer_ms;

        let render_thread = thread::Builder::new()
            .name("orb-voice-render".to_string())
            .spawn(move || match RenderLoop::init(command_receiver, buffer_ms) {
                Ok(render) => {
                    let _ = err_sender.send(None);
                    render.run_event_loop();
                }
                Err(e) => {
                    let _ = err_sender.send(Some(e));
                }
            })
            .map_err(|e| SoundEngineError::BackendUnavailable(e.to_string()))?;

        match err_receiver.recv() {
            Ok(None) => {
                info!("audio output started, {} voices max", config.max_voices);
                Ok(Self {
                    command_sender: Mutex::new(command_sender),
                    voices: Mutex::new(HashMap::new()),
                    next_voice: AtomicU64::new(1),
                    max_voices: config.max_voices,
                    render_thread: Mutex::new(Some(render_thread)),
                })
            }
            Ok(Some(err)) => Err(err),
            Err(_) => Err(SoundEngineError::BackendUnavailable(
                "render thread exited during start".to_string(),
            )),
        }
    }

    fn send(&self, command: VoiceCommand) -> Result<()> {
        self.command_sender.lock().send(command).map_err(|_| {
            SoundEngineError::BackendUnavailable("render thread stopped".to_string())
        })
    }

    fn shared(&self, voice: VoiceHandle) -> Result<Arc<VoiceShared>> {
        self.voices
            .lock()
            .get(&voice)
            .cloned()
            .ok_or_else(|| SoundEngineError::Voice {
                voice,
                reason: "no such voice".to_string(),
            })
    }
}

impl RenderBackend for RodioBackend {
    fn allocate_voice(
        &self,
        asset: &AssetHandle,
        params: &VoiceParams,
        looping: bool,
    ) -> Result<VoiceHandle> {
        // the slot is reserved under the lock, the render thread round trip runs outside it
        let voice = VoiceHandle(self.next_voice.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(VoiceShared::new(params));
        {
            let mut voices = self.voices.lock();
            if voices.len() >= self.max_voices {
                return Err(SoundEngineError::BackendUnavailable(format!(
                    "all {} voices in use",
                    self.max_voices
                )));
            }
            voices.insert(voice, shared.clone());
        }
        let (reply, reply_receiver) = mpsc::channel();
        let allocated = self
            .send(VoiceCommand::Allocate(AllocateVoice {
                voice,
                path: asset.path().to_path_buf(),
                looping,
                shared,
                reply,
            }))
            .and_then(|()| {
                reply_receiver.recv().unwrap_or_else(|_| {
                    Err(SoundEngineError::BackendUnavailable(
                        "render thread stopped".to_string(),
                    ))
                })
            });
        if let Err(e) = allocated {
            self.voices.lock().remove(&voice);
            return Err(e);
        }
        Ok(voice)
    }

    fn release_voice(&self, voice: VoiceHandle) -> Result<()> {
        self.shared(voice)?;
        // the entry stays until the command is sent
        self.send(VoiceCommand::Release(voice))?;
        self.voices.lock().remove(&voice);
        Ok(())
    }

    fn set_voice_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()> {
        self.shared(voice)?.store(params);
        Ok(())
    }

    fn set_voice_state(&self, voice: VoiceHandle, state: VoiceState) -> Result<()> {
        self.shared(voice)?;
        self.send(VoiceCommand::SetState { voice, state })
    }

    fn voice_finished(&self, voice: VoiceHandle) -> bool {
        self.shared(voice)
            .map(|shared| shared.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.send(VoiceCommand::Shutdown);
        if let Some(render_thread) = self.render_thread.lock().take() {
            if render_thread.join().is_err() {
                error!("render thread panicked");
            }
        }
        info!("audio output stopped");
    }
}

struct Voice {
    sink: Sink,
    sound: OrbSound<FileDecoder>,
    shared: Arc<VoiceShared>,
    path: PathBuf,
    looping: bool,
}

/// State owned by the render thread.
struct RenderLoop {
    command_receiver: Receiver<VoiceCommand>,
    voices: HashMap<VoiceHandle, Voice>,
    buffer_ms: u32,
    stream_handle: OutputStreamHandle,
    _output_stream: OutputStream,
}

impl RenderLoop {
    /// Opens the default device. Must run on the render thread, the output stream has to live
    /// on the thread that drives it.
    fn init(command_receiver: Receiver<VoiceCommand>, buffer_ms: u32) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| SoundEngineError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            command_receiver,
            voices: HashMap::new(),
            buffer_ms,
            stream_handle,
            _output_stream: stream,
        })
    }

    /// Main event loop. Responsible for:
    ///
    /// - Processing incoming commands
    /// - Filling the ring buffer of every voice
    /// - Rewinding looping voices and flagging finished ones
    fn run_event_loop(mut self) {
        loop {
            let shutdown = self.process_incoming_commands();
            if shutdown {
                break;
            }
            self.fill_voices();
            thread::sleep(FILL_INTERVAL);
        }
        for (_, voice) in self.voices.drain() {
            voice.sink.stop();
        }
        debug!("render loop finished");
    }

    /// Process commands coming from channel. Returns true if the loop should shut down, false
    /// otherwise.
    fn process_incoming_commands(&mut self) -> bool {
        loop {
            match self.command_receiver.try_recv() {
                Ok(command) => match command {
                    VoiceCommand::Allocate(allocate) => {
                        let result = self.allocate(&allocate);
                        if let Err(e) = &result {
                            warn!("failed to allocate {}: {}", allocate.voice, e);
                        }
                        let _ = allocate.reply.send(result);
                    }
                    VoiceCommand::SetState { voice, state } => {
                        if let Some(v) = self.voices.get(&voice) {
                            match state {
                                VoiceState::Playing => v.sink.play(),
                                VoiceState::Paused => v.sink.pause(),
                                VoiceState::Stopped => v.sink.stop(),
                            }
                            debug!("{} -> {:?}", voice, state);
                        }
                    }
                    VoiceCommand::Release(voice) => {
                        if let Some(v) = self.voices.remove(&voice) {
                            v.sink.stop();
                            debug!("released {}", voice);
                        }
                    }
                    VoiceCommand::Shutdown => {
                        return true;
                    }
                },
                Err(err) => {
                    return match err {
                        TryRecvError::Disconnected => true,
                        _ => false,
                    }
                }
            };
        }
    }

    /// Creates the sink for a voice, paused at the beginning of its asset.
    fn allocate(&mut self, allocate: &AllocateVoice) -> Result<()> {
        let (sound, source) =
            OrbSound::open(&allocate.path, self.buffer_ms, allocate.shared.clone())?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| SoundEngineError::BackendUnavailable(e.to_string()))?;
        sink.pause();
        sink.append(source);
        self.voices.insert(
            allocate.voice,
            Voice {
                sink,
                sound,
                shared: allocate.shared.clone(),
                path: allocate.path.clone(),
                looping: allocate.looping,
            },
        );
        debug!("allocated {} for {}", allocate.voice, allocate.path.display());
        Ok(())
    }

    fn fill_voices(&mut self) {
        for (handle, voice) in self.voices.iter_mut() {
            if voice.sound.is_closed() {
                if voice.sink.empty() && !voice.shared.is_finished() {
                    voice.shared.set_finished();
                    debug!("{} reached end of stream", handle);
                }
                continue;
            }
            if !voice.sound.fill_buffer() {
                continue;
            }
            if !voice.looping {
                voice.sound.close();
            } else if let Err(e) = voice.sound.rewind(&voice.path) {
                warn!("{} can not loop: {}", handle, e);
                voice.sound.close();
            }
        }
    }
}
