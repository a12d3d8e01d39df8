//! Boundary to the component that actually renders audio.
//!
//! The session engine never mixes or decodes anything itself. It allocates a voice per session
//! and then only forwards state and parameter changes through [`RenderBackend`].

use std::fmt;

use crate::asset::AssetHandle;
use crate::error::Result;

pub mod headless;
#[cfg(feature = "rodio-output")]
pub mod output;

/// Backend-side identifier of the mixing resources held by one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub(crate) u64);

impl VoiceHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Play state of a voice as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Playing,
    Paused,
    Stopped,
}

/// Live parameters of a voice. Values are already clamped by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub volume: f32,
    pub pan: f32,
    pub pitch: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
        }
    }
}

impl VoiceParams {
    /// Left and right gain for a stereo frame. Centre pan leaves both channels at `volume`,
    /// a hard pan silences the opposite side.
    pub fn stereo_gains(&self) -> (f32, f32) {
        let left = (1.0 - self.pan).min(1.0);
        let right = (1.0 + self.pan).min(1.0);
        (self.volume * left, self.volume * right)
    }
}

/// Capabilities the session engine needs from a rendering backend.
///
/// Implementations are shared between control threads, so every method takes `&self` and must
/// be safe to call concurrently for different voices. Calls for the same voice are already
/// serialized by the session lock.
pub trait RenderBackend: Send + Sync {
    /// Prepares a voice for `asset`. The voice starts out paused at the beginning of the asset.
    fn allocate_voice(
        &self,
        asset: &AssetHandle,
        params: &VoiceParams,
        looping: bool,
    ) -> Result<VoiceHandle>;

    /// Frees every resource held by `voice`. The handle is invalid afterwards.
    fn release_voice(&self, voice: VoiceHandle) -> Result<()>;

    fn set_voice_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()>;

    fn set_voice_state(&self, voice: VoiceHandle, state: VoiceState) -> Result<()>;

    /// Whether a non-looping voice has played its asset to the end.
    fn voice_finished(&self, voice: VoiceHandle) -> bool;
}
