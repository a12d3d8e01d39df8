//! Control plane for short-lived audio playback sessions.
//!
//! The process-wide [`Engine`] creates [`Session`]s bound to one asset each, keeps them in its
//! [`Registry`] and fans out stop/pause/resume to all of them. Decoding and mixing happen behind
//! the [`RenderBackend`] trait: [`HeadlessBackend`] keeps bookkeeping only, the `rodio-output`
//! feature adds a backend that plays through the default device.
//!
//! ```
//! use std::sync::Arc;
//! use orb_voice::{Engine, HeadlessBackend, SessionState, StaticAssetSource};
//!
//! let engine = Engine::instance();
//! engine.set_backend(Arc::new(HeadlessBackend::default()));
//! engine.set_asset_source(StaticAssetSource::new(["click.wav"]));
//!
//! let click = engine.session(engine.create_session("click.wav", 1.0, false)?);
//! click.play()?;
//! engine.pause_all()?;
//! assert_eq!(click.state()?, SessionState::Paused);
//! click.dispose()?;
//! # Ok::<(), orb_voice::SoundEngineError>(())
//! ```

pub mod asset;
pub mod backend;
#[cfg(feature = "rodio-output")]
mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod session;

pub use asset::{AssetHandle, AssetSource, DirAssetSource, StaticAssetSource};
pub use backend::headless::HeadlessBackend;
#[cfg(feature = "rodio-output")]
pub use backend::output::RodioBackend;
pub use backend::{RenderBackend, VoiceHandle, VoiceParams, VoiceState};
pub use config::EngineConfig;
pub use engine::{Engine, Registry, SessionRef};
pub use error::{Result, SoundEngineError};
pub use handle::SessionHandle;
pub use session::{Session, SessionId, SessionParams, SessionState};
