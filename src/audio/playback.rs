//! Speech playback to the default output device via `cpal`.
//!
//! Synthesised speech arrives as mono 16-bit PCM at the TTS rate.  Each
//! [`SpeakerSink::play`] call resamples it to the device rate, opens a
//! short-lived output stream, and blocks until the clip has drained, so
//! clips never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::resample::{i16_to_f32, resample};
use crate::broker::SpeechAudio;

/// Extra time allowed past the clip length before giving up on the stream.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device available")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

struct Cursor {
    samples: Vec<f32>,
    position: usize,
}

/// Plays [`SpeechAudio`] clips on the host's default output device.
pub struct SpeakerSink {
    device: cpal::Device,
    config: cpal::StreamConfig,
}

impl SpeakerSink {
    /// # Errors
    ///
    /// Fails when the host has no usable output device.
    pub fn open() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;
        let config: cpal::StreamConfig = device.default_output_config()?.into();

        log::info!(
            "speaker: {} @ {} Hz x{}",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self { device, config })
    }

    /// Play `audio` and block until it has been handed to the device.
    pub fn play(&mut self, audio: &SpeechAudio) -> Result<(), PlaybackError> {
        if audio.samples().is_empty() {
            return Ok(());
        }

        let device_rate = self.config.sample_rate.0;
        let channels = self.config.channels.max(1) as usize;
        let samples = resample(&i16_to_f32(audio.samples()), audio.sample_rate(), device_rate);
        let clip_len = Duration::from_secs_f64(samples.len() as f64 / f64::from(device_rate));

        let cursor = Arc::new(Mutex::new(Cursor {
            samples,
            position: 0,
        }));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let cursor = Arc::clone(&cursor);
            let finished = Arc::clone(&finished);
            self.device.build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
                    for frame in data.chunks_mut(channels) {
                        let sample = match cursor.samples.get(cursor.position) {
                            Some(&s) => {
                                cursor.position += 1;
                                s
                            }
                            None => {
                                finished.store(true, Ordering::Release);
                                0.0
                            }
                        };
                        frame.fill(sample);
                    }
                },
                |err: cpal::StreamError| {
                    log::error!("speaker: stream error: {err}");
                },
                None,
            )?
        };
        stream.play()?;

        let deadline = Instant::now() + clip_len + DRAIN_GRACE;
        while !finished.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        if !finished.load(Ordering::Acquire) {
            log::warn!("speaker: playback did not drain within {:?}", clip_len + DRAIN_GRACE);
        }

        log::debug!("speaker: played {:.2}s", audio.duration().as_secs_f32());
        Ok(())
    }
}
