use std::path::PathBuf;

use thiserror::Error;

use crate::backend::VoiceHandle;
use crate::session::{SessionId, SessionState};

/// Errors produced by the session engine and the backends it drives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SoundEngineError {
    #[error("asset not found: {}", path.display())]
    AssetNotFound { path: PathBuf },

    #[error("asset {} can not be decoded: {reason}", path.display())]
    AssetUnreadable { path: PathBuf, reason: String },

    #[error("rendering backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{operation} is not allowed while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("voice {voice:?} failed: {reason}")]
    Voice { voice: VoiceHandle, reason: String },
}

impl SoundEngineError {
    pub(crate) fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        SoundEngineError::InvalidState { operation, state }
    }

    /// Whether this error comes from the backend (or a missing session) rather than from an
    /// illegal transition. Bulk operations only report failures of this kind.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, SoundEngineError::InvalidState { .. })
    }
}

pub type Result<T> = std::result::Result<T, SoundEngineError>;
