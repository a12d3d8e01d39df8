use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, Sample, Source};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::backend::VoiceParams;
use crate::error::{Result, SoundEngineError};

pub(crate) type FileDecoder = Decoder<BufReader<File>>;

/// Sample frames between two reads of the pitch. The mixer only picks up a new sample rate at
/// a frame boundary.
pub(crate) const PITCH_FRAME: usize = 512;

/// Voice state shared between control threads and the audio source. Volume, pan and pitch are
/// stored as `f32` bits. Volume and pan are read for every sample, pitch once per frame.
#[derive(Debug)]
pub(crate) struct VoiceShared {
    volume: AtomicU32,
    pan: AtomicU32,
    pitch: AtomicU32,
    finished: AtomicBool,
}

impl VoiceShared {
    pub fn new(params: &VoiceParams) -> Self {
        Self {
            volume: AtomicU32::new(params.volume.to_bits()),
            pan: AtomicU32::new(params.pan.to_bits()),
            pitch: AtomicU32::new(params.pitch.to_bits()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn store(&self, params: &VoiceParams) {
        self.volume.store(params.volume.to_bits(), Ordering::Relaxed);
        self.pan.store(params.pan.to_bits(), Ordering::Relaxed);
        self.pitch.store(params.pitch.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch.load(Ordering::Relaxed))
    }

    /// Rate the mixer should resample from so the asset plays `pitch` times faster.
    fn pitched_rate(&self, sample_rate: u32) -> u32 {
        ((sample_rate as f32 * self.pitch()) as u32).max(1)
    }

    fn stereo_gains(&self) -> (f32, f32) {
        VoiceParams {
            volume: self.volume(),
            pan: f32::from_bits(self.pan.load(Ordering::Relaxed)),
            pitch: 1.0,
        }
        .stereo_gains()
    }

    pub fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Decoder side of a voice. Lives on the render thread and keeps the ring buffer filled.
pub(crate) struct OrbSound<I> {
    reader: I,
    buffer: Option<Producer<i16>>,
}

fn open_decoder(path: &Path) -> Result<FileDecoder> {
    let file = File::open(path).map_err(|_| SoundEngineError::AssetNotFound {
        path: path.to_path_buf(),
    })?;
    Decoder::new(BufReader::new(file)).map_err(|e| SoundEngineError::AssetUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl OrbSound<FileDecoder> {
    pub fn open(
        path: &Path,
        buffer_ms: u32,
        shared: Arc<VoiceShared>,
    ) -> Result<(Self, OrbSoundSource)> {
        let decoder = open_decoder(path)?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let capacity = (sample_rate as usize * channels as usize * buffer_ms as usize / 1000)
            .max(channels as usize);
        Ok(OrbSound::with_reader(
            decoder,
            capacity,
            channels,
            sample_rate,
            shared,
        ))
    }

    /// Starts reading the asset from the beginning again. Used when a looping voice runs out.
    pub fn rewind(&mut self, path: &Path) -> Result<()> {
        self.reader = open_decoder(path)?;
        Ok(())
    }
}

impl<I> OrbSound<I>
where
    I: Iterator<Item = i16>,
{
    pub fn with_reader(
        reader: I,
        capacity: usize,
        channels: u16,
        sample_rate: u32,
        shared: Arc<VoiceShared>,
    ) -> (Self, OrbSoundSource) {
        let (producer, consumer) = RingBuffer::new(capacity);
        let source = OrbSoundSource {
            buffer: consumer,
            channels,
            sample_rate,
            frame_rate: shared.pitched_rate(sample_rate),
            frame_left: PITCH_FRAME * channels.max(1) as usize,
            shared,
            channel: 0,
        };
        let mut sound = OrbSound {
            reader,
            buffer: Some(producer),
        };
        sound.fill_buffer();
        (sound, source)
    }

    /// Moves as many samples as fit from the reader into the ring buffer. Returns true once the
    /// reader is exhausted.
    pub fn fill_buffer(&mut self) -> bool {
        let buffer = match self.buffer.as_mut() {
            Some(buffer) => buffer,
            None => return false,
        };
        for _ in 0..buffer.slots() {
            match self.reader.next() {
                Some(sample) => {
                    if buffer.push(sample).is_err() {
                        break;
                    }
                }
                None => return true,
            }
        }
        false
    }

    /// Drops the producer. The source plays what is left in the buffer and then ends.
    pub fn close(&mut self) {
        self.buffer = None;
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_none()
    }
}

/// Audio side of a voice, appended to the voice's sink.
///
/// Pitch is applied by announcing a scaled sample rate: the mixer resamples every frame from
/// `frame_rate`, so a pitch change takes effect at the next frame boundary.
pub(crate) struct OrbSoundSource {
    buffer: Consumer<i16>,
    channels: u16,
    sample_rate: u32,
    frame_rate: u32,
    frame_left: usize,
    shared: Arc<VoiceShared>,
    channel: u16,
}

impl OrbSoundSource {
    fn advance_frame(&mut self) {
        self.frame_left -= 1;
        if self.frame_left == 0 {
            self.frame_left = PITCH_FRAME * self.channels.max(1) as usize;
            self.frame_rate = self.shared.pitched_rate(self.sample_rate);
        }
    }
}

impl Iterator for OrbSoundSource {
    type Item = i16;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.buffer.pop() {
            Ok(sample) => sample,
            // Producer was dropped: end of asset, or the voice was released
            Err(_) if self.buffer.is_abandoned() => return None,
            // Buffer underrun. Producing silence
            Err(_) => <i16 as Sample>::zero_value(),
        };
        let gain = if self.channels == 2 {
            let (left, right) = self.shared.stereo_gains();
            if self.channel == 0 {
                left
            } else {
                right
            }
        } else {
            self.shared.volume()
        };
        self.channel = (self.channel + 1) % self.channels.max(1);
        self.advance_frame();
        Some(sample.amplify(gain))
    }
}

impl Source for OrbSoundSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.frame_left)
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.frame_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(volume: f32, pan: f32) -> Arc<VoiceShared> {
        Arc::new(VoiceShared::new(&VoiceParams {
            volume,
            pan,
            pitch: 1.0,
        }))
    }

    #[test]
    fn pitch_change_applies_at_next_frame() {
        let voice = shared(1.0, 0.0);
        let (_sound, mut source) =
            OrbSound::with_reader(std::iter::empty(), 4, 2, 44100, voice.clone());
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.current_frame_len(), Some(PITCH_FRAME * 2));

        voice.store(&VoiceParams {
            volume: 1.0,
            pan: 0.0,
            pitch: 2.0,
        });
        assert_eq!(voice.pitch(), 2.0);
        source.next();
        // the current frame keeps its rate
        assert_eq!(source.sample_rate(), 44100);
        for _ in 1..PITCH_FRAME * 2 {
            source.next();
        }
        assert_eq!(source.sample_rate(), 88200);
        assert_eq!(source.current_frame_len(), Some(PITCH_FRAME * 2));
    }

    #[test]
    fn fill_buffer_reports_exhausted_reader() {
        let samples = vec![1i16; 6];
        let (mut sound, mut source) =
            OrbSound::with_reader(samples.into_iter(), 4, 2, 44100, shared(1.0, 0.0));
        // the constructor already filled all four slots
        assert!(!sound.fill_buffer());
        for _ in 0..4 {
            assert_eq!(source.next(), Some(1));
        }
        assert!(sound.fill_buffer());
    }

    #[test]
    fn source_ends_after_close() {
        let (mut sound, mut source) =
            OrbSound::with_reader(vec![5i16, 5].into_iter(), 4, 2, 44100, shared(1.0, 0.0));
        assert!(sound.fill_buffer());
        sound.close();
        assert!(sound.is_closed());
        assert_eq!(source.next(), Some(5));
        assert_eq!(source.next(), Some(5));
        assert_eq!(source.next(), None);
    }

    #[test]
    fn underrun_produces_silence() {
        let (_sound, mut source) =
            OrbSound::with_reader(std::iter::empty(), 4, 1, 44100, shared(1.0, 0.0));
        assert_eq!(source.next(), Some(0));
    }

    #[test]
    fn pan_and_volume_apply_to_live_source() {
        let voice = shared(1.0, 0.0);
        let (_sound, mut source) =
            OrbSound::with_reader(vec![1000i16; 8].into_iter(), 8, 2, 44100, voice.clone());
        assert_eq!(source.next(), Some(1000));
        assert_eq!(source.next(), Some(1000));

        voice.store(&VoiceParams {
            volume: 0.5,
            pan: -1.0,
            pitch: 1.0,
        });
        assert_eq!(source.next(), Some(500));
        assert_eq!(source.next(), Some(0));
    }
}
