//! Microphone capture via `cpal`.
//!
//! [`MicrophoneSource`] wraps the cpal host/device/stream lifecycle and turns
//! the device's native stream into fixed-size 16-bit mono frames at the
//! requested rate:
//!
//! ```text
//! cpal callback (f32, N ch, device rate) → stereo_to_mono → resample
//!     → f32_to_i16 → mpsc → read_frame() (fixed frame_size)
//! ```
//!
//! `cpal::Stream` is not `Send` on every platform, so a source must be opened
//! on the thread that reads from it.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::frame::{AudioFrame, CaptureError, FrameSource};
use super::resample::{f32_to_i16, resample, stereo_to_mono};

// ---------------------------------------------------------------------------
// CaptureSettings
// ---------------------------------------------------------------------------

/// What the segmenter wants from the microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Input device name; `None` picks the host default.
    pub device: Option<String>,
    /// Output frame rate in Hz.
    pub sample_rate: u32,
    /// Samples per frame.
    pub frame_size: usize,
    /// Longest a single `read_frame` call may block.
    pub read_timeout: Duration,
}

// ---------------------------------------------------------------------------
// MicrophoneSource
// ---------------------------------------------------------------------------

/// Blocking frame reader over a live cpal input stream.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use voice_robot::audio::{CaptureSettings, FrameSource, MicrophoneSource};
///
/// let mut mic = MicrophoneSource::open(&CaptureSettings {
///     device: None,
///     sample_rate: 16_000,
///     frame_size: 1_024,
///     read_timeout: Duration::from_millis(500),
/// })
/// .unwrap();
/// while let Ok(Some(frame)) = mic.read_frame() {
///     println!("{} samples, rms {:.3}", frame.len(), frame.rms());
/// }
/// ```
pub struct MicrophoneSource {
    /// Keeps the hardware stream alive; dropping it stops capture.
    _stream: cpal::Stream,
    rx: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    sample_rate: u32,
    frame_size: usize,
    read_timeout: Duration,
}

impl MicrophoneSource {
    /// Open the configured input device and start streaming.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when the device is missing, otherwise the
    /// cpal error that prevented the stream from starting.
    pub fn open(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match &settings.device {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::NoDevice(Some(name.clone())))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoDevice(None))?,
        };

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let device_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();
        let target_rate = settings.sample_rate;

        log::info!(
            "microphone: {} @ {device_rate} Hz x{channels}, framing {} samples @ {target_rate} Hz",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            settings.frame_size,
        );

        let (tx, rx) = mpsc::channel::<Vec<i16>>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = stereo_to_mono(data, channels);
                let samples = f32_to_i16(&resample(&mono, device_rate, target_rate));
                // Receiver gone means the source was dropped; nothing to do.
                let _ = tx.send(samples);
            },
            |err: cpal::StreamError| {
                log::error!("microphone: stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            rx,
            pending: Vec::with_capacity(settings.frame_size * 2),
            sample_rate: target_rate,
            frame_size: settings.frame_size.max(1),
            read_timeout: settings.read_timeout,
        })
    }
}

impl FrameSource for MicrophoneSource {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError> {
        let deadline = Instant::now() + self.read_timeout;
        while self.pending.len() < self.frame_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Disconnected),
            }
        }
        let rest = self.pending.split_off(self.frame_size);
        let samples = std::mem::replace(&mut self.pending, rest);
        Ok(Some(AudioFrame::new(samples, self.sample_rate)))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
