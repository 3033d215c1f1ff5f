//! Fixed-size PCM frames and the seams the segmenter reads them through.

use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One fixed-size chunk of mono 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude normalised to `[0.0, 1.0]`.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean_sq = self
            .samples
            .iter()
            .map(|&s| {
                let x = f32::from(s) / 32_768.0;
                x * x
            })
            .sum::<f32>()
            / self.samples.len() as f32;
        mean_sq.sqrt()
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while opening or reading an audio input.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found{}", .0.as_deref().map(|n| format!(" named '{n}'")).unwrap_or_default())]
    NoDevice(Option<String>),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio stream disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Blocking source of fixed-size frames.
pub trait FrameSource {
    /// Read the next frame.  `Ok(None)` means no full frame arrived within
    /// the source's read timeout.
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError>;

    /// Rate of the frames this source produces.
    fn sample_rate(&self) -> u32;
}

/// Classifies a frame as speech or not.
pub trait VoiceClassifier {
    fn is_voiced(&mut self, frame: &AudioFrame) -> bool;
}

impl<F> VoiceClassifier for F
where
    F: FnMut(&AudioFrame) -> bool,
{
    fn is_voiced(&mut self, frame: &AudioFrame) -> bool {
        self(frame)
    }
}
