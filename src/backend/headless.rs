//! Backend without an audio device.
//!
//! Keeps the bookkeeping a real renderer would keep (voice table, states, parameters, voice
//! budget) so the engine can run on hosts without output and in tests. End of stream and
//! renderer failures are simulated through [`HeadlessBackend::finish_voice`],
//! [`HeadlessBackend::fail_voice`] and [`HeadlessBackend::fail_release`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::asset::AssetHandle;
use crate::backend::{RenderBackend, VoiceHandle, VoiceParams, VoiceState};
use crate::config::DEFAULT_MAX_VOICES;
use crate::error::{Result, SoundEngineError};

#[derive(Debug, Clone)]
struct HeadlessVoice {
    asset: AssetHandle,
    state: VoiceState,
    params: VoiceParams,
    looping: bool,
    finished: bool,
    failing: bool,
    release_failing: bool,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    voices: Mutex<HashMap<VoiceHandle, HeadlessVoice>>,
    next_voice: AtomicU64,
    max_voices: usize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VOICES)
    }
}

impl HeadlessBackend {
    pub fn new(max_voices: usize) -> Self {
        Self {
            voices: Mutex::new(HashMap::new()),
            next_voice: AtomicU64::new(1),
            max_voices,
        }
    }

    pub fn live_voices(&self) -> usize {
        self.voices.lock().len()
    }

    pub fn voice_state(&self, voice: VoiceHandle) -> Option<VoiceState> {
        self.voices.lock().get(&voice).map(|v| v.state)
    }

    pub fn voice_params(&self, voice: VoiceHandle) -> Option<VoiceParams> {
        self.voices.lock().get(&voice).map(|v| v.params)
    }

    pub fn voice_asset(&self, voice: VoiceHandle) -> Option<AssetHandle> {
        self.voices.lock().get(&voice).map(|v| v.asset.clone())
    }

    /// Simulates the renderer reaching the end of the asset. Looping voices wrap around instead.
    pub fn finish_voice(&self, voice: VoiceHandle) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            if !v.looping {
                v.finished = true;
            }
        }
    }

    /// Makes every further command on `voice` fail, as a renderer that lost the voice would.
    pub fn fail_voice(&self, voice: VoiceHandle, failing: bool) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.failing = failing;
        }
    }

    /// Makes only [`RenderBackend::release_voice`] fail for `voice`.
    pub fn fail_release(&self, voice: VoiceHandle, failing: bool) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.release_failing = failing;
        }
    }

    fn with_voice<R>(
        &self,
        voice: VoiceHandle,
        f: impl FnOnce(&mut HeadlessVoice) -> R,
    ) -> Result<R> {
        let mut voices = self.voices.lock();
        let v = voices.get_mut(&voice).ok_or_else(|| SoundEngineError::Voice {
            voice,
            reason: "no such voice".to_string(),
        })?;
        if v.failing {
            return Err(SoundEngineError::Voice {
                voice,
                reason: "renderer rejected command".to_string(),
            });
        }
        Ok(f(v))
    }
}

impl RenderBackend for HeadlessBackend {
    fn allocate_voice(
        &self,
        asset: &AssetHandle,
        params: &VoiceParams,
        looping: bool,
    ) -> Result<VoiceHandle> {
        let mut voices = self.voices.lock();
        if voices.len() >= self.max_voices {
            return Err(SoundEngineError::BackendUnavailable(format!(
                "all {} voices in use",
                self.max_voices
            )));
        }
        let voice = VoiceHandle(self.next_voice.fetch_add(1, Ordering::Relaxed));
        voices.insert(
            voice,
            HeadlessVoice {
                asset: asset.clone(),
                state: VoiceState::Paused,
                params: *params,
                looping,
                finished: false,
                failing: false,
                release_failing: false,
            },
        );
        debug!("allocated {} for {}", voice, asset.path().display());
        Ok(voice)
    }

    fn release_voice(&self, voice: VoiceHandle) -> Result<()> {
        if self.with_voice(voice, |v| v.release_failing)? {
            return Err(SoundEngineError::Voice {
                voice,
                reason: "renderer kept the voice".to_string(),
            });
        }
        self.voices.lock().remove(&voice);
        debug!("released {}", voice);
        Ok(())
    }

    fn set_voice_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()> {
        self.with_voice(voice, |v| v.params = *params)
    }

    fn set_voice_state(&self, voice: VoiceHandle, state: VoiceState) -> Result<()> {
        self.with_voice(voice, |v| v.state = state)
    }

    fn voice_finished(&self, voice: VoiceHandle) -> bool {
        self.voices
            .lock()
            .get(&voice)
            .map(|v| v.finished)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> AssetHandle {
        AssetHandle::new("x")
    }

    #[test]
    fn voices_start_paused_and_follow_commands() {
        let backend = HeadlessBackend::default();
        let voice = backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .unwrap();
        assert_eq!(backend.voice_state(voice), Some(VoiceState::Paused));
        assert_eq!(backend.voice_asset(voice), Some(asset()));

        backend.set_voice_state(voice, VoiceState::Playing).unwrap();
        assert_eq!(backend.voice_state(voice), Some(VoiceState::Playing));

        let params = VoiceParams {
            volume: 0.25,
            pan: 1.0,
            pitch: 2.0,
        };
        backend.set_voice_params(voice, &params).unwrap();
        assert_eq!(backend.voice_params(voice), Some(params));

        backend.release_voice(voice).unwrap();
        assert_eq!(backend.live_voices(), 0);
        assert!(backend.release_voice(voice).is_err());
    }

    #[test]
    fn voice_budget_is_enforced() {
        let backend = HeadlessBackend::new(1);
        let first = backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .unwrap();
        assert!(matches!(
            backend.allocate_voice(&asset(), &VoiceParams::default(), false),
            Err(SoundEngineError::BackendUnavailable(_))
        ));
        backend.release_voice(first).unwrap();
        assert!(backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .is_ok());
    }

    #[test]
    fn looping_voices_never_finish() {
        let backend = HeadlessBackend::default();
        let once = backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .unwrap();
        let looped = backend
            .allocate_voice(&asset(), &VoiceParams::default(), true)
            .unwrap();
        backend.finish_voice(once);
        backend.finish_voice(looped);
        assert!(backend.voice_finished(once));
        assert!(!backend.voice_finished(looped));
    }

    #[test]
    fn failing_voice_rejects_commands() {
        let backend = HeadlessBackend::default();
        let voice = backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .unwrap();
        backend.fail_voice(voice, true);
        assert!(matches!(
            backend.set_voice_state(voice, VoiceState::Playing),
            Err(SoundEngineError::Voice { .. })
        ));
        backend.fail_voice(voice, false);
        assert!(backend.set_voice_state(voice, VoiceState::Playing).is_ok());
    }

    #[test]
    fn failing_release_keeps_voice() {
        let backend = HeadlessBackend::default();
        let voice = backend
            .allocate_voice(&asset(), &VoiceParams::default(), false)
            .unwrap();
        backend.fail_release(voice, true);
        assert!(backend.set_voice_state(voice, VoiceState::Stopped).is_ok());
        assert!(matches!(
            backend.release_voice(voice),
            Err(SoundEngineError::Voice { .. })
        ));
        assert_eq!(backend.live_voices(), 1);

        backend.fail_release(voice, false);
        backend.release_voice(voice).unwrap();
        assert_eq!(backend.live_voices(), 0);
    }
}
