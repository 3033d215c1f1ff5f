//! WAV encoding for utterances (mono, 16-bit PCM) via `hound`.
//!
//! The reasoning request ships the utterance as an in-memory WAV blob; when
//! debug recordings are enabled the same bytes layout is also written to
//! disk by [`RecordingWriter`].

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use crate::broker::Utterance;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("wav encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("cannot create recordings directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode mono samples as a complete WAV file in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), mono_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

/// Write mono samples to a WAV file at `path`.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<(), WavError> {
    let mut writer = WavWriter::create(path.as_ref(), mono_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    log::debug!(
        "wav: wrote {} samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// RecordingWriter
// ---------------------------------------------------------------------------

/// Saves accepted utterances as `recording_<unix_secs>.wav` files.
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    dir: PathBuf,
}

impl RecordingWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `utterance` and return the file path.  A second recording in
    /// the same second gets a `_<n>` suffix instead of overwriting.
    pub fn save(&self, utterance: &Utterance) -> Result<PathBuf, WavError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| WavError::Directory {
            path: self.dir.clone(),
            source,
        })?;

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.free_path(secs);

        write_wav(&path, utterance.samples(), utterance.sample_rate())?;
        Ok(path)
    }

    fn free_path(&self, secs: u64) -> PathBuf {
        let path = self.dir.join(format!("recording_{secs}.wav"));
        if !path.exists() {
            return path;
        }
        (1..)
            .map(|n| self.dir.join(format!("recording_{secs}_{n}.wav")))
            .find(|p| !p.exists())
            .unwrap_or(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn encoded_blob_is_mono_16_bit() {
        let bytes = encode_wav(&[0, 1_000, -1_000, i16::MAX], 16_000).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 8);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn recordings_are_named_by_time_and_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::new(dir.path().join("recordings"));
        let utterance = Utterance::new(vec![5; 320], 16_000, Duration::from_millis(20));

        let first = writer.save(&utterance).unwrap();
        let second = writer.save(&utterance).unwrap();

        assert_ne!(first, second);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("recording_") && name.ends_with(".wav"), "{name}");
            let reader = hound::WavReader::open(path).unwrap();
            assert_eq!(reader.len(), 320);
        }
    }
}
