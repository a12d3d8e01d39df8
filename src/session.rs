//! One playback instance bound to a single asset.
//!
//! ```text
//! Uninitialized -> Ready -> Playing <-> Paused
//!                    |         |          |
//!                    +---------+----------+--> Stopped
//! ```
//!
//! `Stopped` is terminal. A session never locks anything itself; callers that share it wrap it
//! in the registry's per-session lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::asset::{AssetHandle, AssetSource};
use crate::backend::{RenderBackend, VoiceHandle, VoiceParams, VoiceState};
use crate::error::{Result, SoundEngineError};

/// Process-unique session identifier. Never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out session ids, starting at 1.
#[derive(Debug)]
pub(crate) struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    /// Gain in [0, 1].
    pub volume: f32,
    /// Stereo position in [-1, 1], 0 is centre.
    pub pan: f32,
    /// Playback rate factor, 1.0 is the asset's own rate.
    pub pitch: f32,
    pub looping: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
            looping: false,
        }
    }
}

impl SessionParams {
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            volume: self.volume,
            pan: self.pan,
            pitch: self.pitch,
        }
    }
}

fn checked_volume(volume: f32) -> Result<f32> {
    if !volume.is_finite() {
        return Err(SoundEngineError::InvalidParameter {
            name: "volume",
            value: volume,
        });
    }
    Ok(volume.clamp(0.0, 1.0))
}

fn checked_pan(pan: f32) -> Result<f32> {
    if !pan.is_finite() {
        return Err(SoundEngineError::InvalidParameter {
            name: "pan",
            value: pan,
        });
    }
    Ok(pan.clamp(-1.0, 1.0))
}

fn checked_pitch(pitch: f32) -> Result<f32> {
    if !pitch.is_finite() || pitch <= 0.0 {
        return Err(SoundEngineError::InvalidParameter {
            name: "pitch",
            value: pitch,
        });
    }
    Ok(pitch)
}

pub struct Session {
    id: Option<SessionId>,
    state: SessionState,
    params: SessionParams,
    asset: Option<AssetHandle>,
    voice: Option<VoiceHandle>,
    backend: Arc<dyn RenderBackend>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("params", &self.params)
            .field("asset", &self.asset)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an uninitialized session that will render through `backend`.
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            id: None,
            state: SessionState::Uninitialized,
            params: SessionParams::default(),
            asset: None,
            voice: None,
            backend,
        }
    }

    /// Resolves `path`, allocates a voice for it and moves the session to `Ready`.
    ///
    /// On failure the session stays `Uninitialized` and holds no backend resources.
    pub fn init(
        &mut self,
        id: SessionId,
        assets: &dyn AssetSource,
        path: &str,
        volume: f32,
        looping: bool,
    ) -> Result<SessionId> {
        if self.state != SessionState::Uninitialized {
            return Err(SoundEngineError::invalid_state("init", self.state));
        }
        let params = SessionParams {
            volume: checked_volume(volume)?,
            looping,
            ..self.params
        };
        let asset = assets.resolve(path)?;
        let voice = self
            .backend
            .allocate_voice(&asset, &params.voice_params(), looping)?;

        self.id = Some(id);
        self.params = params;
        self.asset = Some(asset);
        self.voice = Some(voice);
        self.state = SessionState::Ready;
        debug!("session {} ready on {} ({})", id, voice, path);
        Ok(id)
    }

    /// Starts output from the beginning when `Ready`, or from the paused position when `Paused`.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Paused => {
                self.transition("play", VoiceState::Playing, SessionState::Playing)
            }
            state => Err(SoundEngineError::invalid_state("play", state)),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            SessionState::Playing => {
                self.transition("pause", VoiceState::Paused, SessionState::Paused)
            }
            state => Err(SoundEngineError::invalid_state("pause", state)),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            SessionState::Paused => {
                self.transition("resume", VoiceState::Playing, SessionState::Playing)
            }
            state => Err(SoundEngineError::invalid_state("resume", state)),
        }
    }

    /// Silences the session and releases its voice.
    ///
    /// Once the voice is silenced the session is `Stopped`, even if the release that follows
    /// fails. The voice is then kept as a pending release, and stopping again retries it.
    /// Stopping a stopped and released session is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            SessionState::Uninitialized => {
                Err(SoundEngineError::invalid_state("stop", self.state))
            }
            SessionState::Stopped => self.release_voice(),
            _ => {
                let voice = self.live_voice("stop")?;
                self.backend.set_voice_state(voice, VoiceState::Stopped)?;
                debug!("session {:?}: {:?} -> Stopped", self.id, self.state);
                self.state = SessionState::Stopped;
                self.release_voice()
            }
        }
    }

    /// Whether a stopped session still waits for its voice to be released.
    pub fn release_pending(&self) -> bool {
        self.state == SessionState::Stopped && self.voice.is_some()
    }

    /// Updates pitch, pan and volume. A session holding a voice applies them to it right away,
    /// without interrupting playback.
    pub fn set_params(&mut self, pitch: f32, pan: f32, volume: f32) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Err(SoundEngineError::invalid_state("set_params", self.state));
        }
        let params = SessionParams {
            pitch: checked_pitch(pitch)?,
            pan: checked_pan(pan)?,
            volume: checked_volume(volume)?,
            ..self.params
        };
        self.apply_params(params)
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Err(SoundEngineError::invalid_state("set_volume", self.state));
        }
        let params = SessionParams {
            volume: checked_volume(volume)?,
            ..self.params
        };
        self.apply_params(params)
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> SessionParams {
        self.params
    }

    pub fn asset(&self) -> Option<&AssetHandle> {
        self.asset.as_ref()
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.voice
    }

    /// Whether a non-looping session has played its asset to the end. The session stays in its
    /// current state until it is stopped or reaped.
    pub fn is_finished(&self) -> bool {
        match self.voice {
            Some(voice) if !self.params.looping => self.backend.voice_finished(voice),
            _ => false,
        }
    }

    fn apply_params(&mut self, params: SessionParams) -> Result<()> {
        if let Some(voice) = self.voice {
            self.backend.set_voice_params(voice, &params.voice_params())?;
        }
        self.params = params;
        Ok(())
    }

    fn transition(
        &mut self,
        operation: &'static str,
        voice_state: VoiceState,
        next: SessionState,
    ) -> Result<()> {
        let voice = self.live_voice(operation)?;
        self.backend.set_voice_state(voice, voice_state)?;
        debug!("session {:?}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    fn release_voice(&mut self) -> Result<()> {
        if let Some(voice) = self.voice {
            self.backend.release_voice(voice)?;
            self.voice = None;
            debug!("session {:?} released {}", self.id, voice);
        }
        Ok(())
    }

    fn live_voice(&self, operation: &'static str) -> Result<VoiceHandle> {
        self.voice
            .ok_or_else(|| SoundEngineError::invalid_state(operation, self.state))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(voice) = self.voice.take() {
            if let Err(e) = self.backend.release_voice(voice) {
                warn!("session {:?} dropped without releasing {}: {}", self.id, voice, e);
            }
        }
    }
}
