use std::time::Duration;

use serde::Deserialize;

/// Upper bound on voices a backend keeps alive at once.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Ring buffer length per voice. 50ms keeps the render loop responsive without underruns.
pub const DEFAULT_BUFFER_MS: u32 = 50;

/// Engine configuration.
///
/// Can be built in code through the `with_*` methods or deserialized from JSON:
///
/// ```
/// let config = orb_voice::EngineConfig::from_json(r#"{ "max_voices": 8 }"#).unwrap();
/// assert_eq!(config.max_voices, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of simultaneously allocated voices.
    pub max_voices: usize,
    /// Interval of the background reaper. `None` keeps removal a caller action only.
    pub reap_interval_ms: Option<u64>,
    /// Length of each voice's sample ring buffer.
    pub buffer_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_voices: DEFAULT_MAX_VOICES,
            reap_interval_ms: None,
            buffer_ms: DEFAULT_BUFFER_MS,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    #[must_use]
    pub fn with_reap_interval(mut self, interval: Option<Duration>) -> Self {
        self.reap_interval_ms = interval.map(|i| i.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_buffer_ms(mut self, buffer_ms: u32) -> Self {
        self.buffer_ms = buffer_ms;
        self
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        self.reap_interval_ms.map(Duration::from_millis)
    }
}
