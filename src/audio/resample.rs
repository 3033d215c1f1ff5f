//! Sample-rate conversion, channel mixing and sample format helpers.
//!
//! The microphone delivers interleaved `f32` at whatever rate the device
//! prefers; the segmenter wants 16 kHz mono `i16`.  Speech synthesis returns
//! 24 kHz mono `i16`; the speaker wants its own rate and channel count.
//! Both directions go through the helpers here.
//!
//! The resampler is linear interpolation: cheap, dependency-free, and good
//! enough for speech that is about to be classified by energy or played
//! through a small speaker.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.  A trailing partial
/// frame is dropped.
///
/// ```rust
/// use voice_robot::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Duplicate each mono sample across `channels` interleaved outputs.
pub fn mono_to_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    let n = channels.max(1) as usize;
    samples
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(n))
        .collect()
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` to `target_rate` Hz using
/// linear interpolation.
///
/// Equal rates return a copy.  A zero rate on either side yields an empty
/// vector.
///
/// ```rust
/// use voice_robot::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// assert_eq!(resample(&hi, 24_000, 48_000).len(), 960);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Sample format
// ---------------------------------------------------------------------------

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32_768.0).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
