//! Simple energy-based Voice Activity Detection (VAD).
//!
//! [`EnergyVad`] classifies each 16 kHz mono frame independently: a frame is
//! *voice* when its RMS amplitude exceeds the configured threshold.  Pauses
//! inside a sentence are bridged by the segmenter's silence timer, so no
//! smoothing happens here.

use super::frame::{AudioFrame, VoiceClassifier};

// ---------------------------------------------------------------------------
// EnergyVad
// ---------------------------------------------------------------------------

/// RMS-threshold voice classifier.
///
/// # Example
///
/// ```rust
/// use voice_robot::audio::{AudioFrame, EnergyVad, VoiceClassifier};
///
/// // 0.01 RMS threshold, typical for a quiet room
/// let mut vad = EnergyVad::new(0.01);
///
/// assert!(!vad.is_voiced(&AudioFrame::new(vec![0; 480], 16_000)));
/// assert!(vad.is_voiced(&AudioFrame::new(vec![8_000; 480], 16_000)));
/// ```
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold; frames at or below this are silence.
    rms_threshold: f32,
}

impl EnergyVad {
    /// `rms_threshold` should be in `[0.0, 1.0]`.  A typical value is
    /// `0.01` for quiet microphones; use `0.02`–`0.05` near motors.
    pub fn new(rms_threshold: f32) -> Self {
        Self { rms_threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }
}

impl VoiceClassifier for EnergyVad {
    fn is_voiced(&mut self, frame: &AudioFrame) -> bool {
        !frame.is_empty() && frame.rms() > self.rms_threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(amplitude: i16) -> AudioFrame {
        AudioFrame::new(vec![amplitude; 480], 16_000)
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut vad = EnergyVad::new(0.01);
        assert!(!vad.is_voiced(&frame(0)));
    }

    #[test]
    fn loud_frame_is_voiced() {
        let mut vad = EnergyVad::new(0.01);
        assert!(vad.is_voiced(&frame(16_000)));
    }

    #[test]
    fn threshold_is_exclusive() {
        // 3277 / 32768 ≈ 0.1
        let mut vad = EnergyVad::new(frame(3_277).rms());
        assert!(!vad.is_voiced(&frame(3_277)));
        assert!(vad.is_voiced(&frame(3_300)));
    }

    #[test]
    fn empty_frame_is_unvoiced() {
        let mut vad = EnergyVad::new(0.0);
        assert!(!vad.is_voiced(&AudioFrame::new(Vec::new(), 16_000)));
    }

    #[test]
    fn threshold_getter() {
        let vad = EnergyVad::new(0.05);
        assert!((vad.threshold() - 0.05).abs() < 1e-7);
    }
}
