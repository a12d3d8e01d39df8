use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::backend::output::sound::VoiceShared;
use crate::backend::{VoiceHandle, VoiceState};
use crate::error::Result;

/// Messages consumed by the render thread.
pub(crate) enum VoiceCommand {
    Allocate(AllocateVoice),
    SetState { voice: VoiceHandle, state: VoiceState },
    Release(VoiceHandle),
    Shutdown,
}

pub(crate) struct AllocateVoice {
    pub voice: VoiceHandle,
    pub path: PathBuf,
    pub looping: bool,
    /// Volume, pan and pitch, shared with the audio source so they apply without a round trip.
    pub shared: Arc<VoiceShared>,
    pub reply: Sender<Result<()>>,
}
