//! Audio I/O: microphone frames in, synthesised speech out.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono → resample → i16
//!           → MicrophoneSource::read_frame (fixed size) → EnergyVad
//!           → Segmenter → Utterance → encode_wav → cloud
//!
//! SpeechAudio (24 kHz i16) → resample → SpeakerSink (device rate)
//! ```
//!
//! The segmenter only sees the [`FrameSource`] and [`VoiceClassifier`]
//! traits, so it runs against scripted sources in tests.

pub mod capture;
pub mod frame;
pub mod playback;
pub mod resample;
pub mod vad;
pub mod wav;

pub use capture::{CaptureSettings, MicrophoneSource};
pub use frame::{AudioFrame, CaptureError, FrameSource, VoiceClassifier};
pub use playback::{PlaybackError, SpeakerSink};
pub use resample::{f32_to_i16, i16_to_f32, mono_to_interleaved, resample, stereo_to_mono};
pub use vad::EnergyVad;
pub use wav::{encode_wav, write_wav, RecordingWriter, WavError};
