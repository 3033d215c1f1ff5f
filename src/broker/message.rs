//! Payload types carried by broker channels and variables.
//!
//! Every message type is `Clone + PartialEq` so channels can support
//! value-equality `remove` / `contains`.  Large payloads (audio, images) are
//! held behind `Arc<[_]>` so snapshots and clones stay cheap.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Identifier a component uses when announcing itself on
/// `running_components`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// Utterance / ReasoningRequest
// ---------------------------------------------------------------------------

/// One contiguous span of detected speech, packaged as immutable 16-bit mono
/// PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Arc<[i16]>,
    sample_rate: u32,
    /// Audio-time span from speech onset to the frame that closed it.
    span: Duration,
}

impl Utterance {
    pub fn new(samples: Vec<i16>, sample_rate: u32, span: Duration) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            span,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    /// Duration of the audio actually buffered (may differ from [`span`]
    /// when the source dropped frames).
    ///
    /// [`span`]: Self::span
    pub fn audio_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Work item for the cloud reasoning collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub utterance: Utterance,
    /// Optional scene image sent alongside the audio.
    pub image: Option<CameraImage>,
}

impl From<Utterance> for ReasoningRequest {
    fn from(utterance: Utterance) -> Self {
        Self {
            utterance,
            image: None,
        }
    }
}

// ---------------------------------------------------------------------------
// FunctionCall
// ---------------------------------------------------------------------------

/// A remote or local function invocation requested by the reasoning service.
///
/// Serialises to the network wire object `{"name": ..., "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: serde_json::Map::new(),
        }
    }

    /// Builder-style argument insertion.
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Numeric argument lookup (integers are widened).
    pub fn f64_arg(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(serde_json::Value::as_f64)
    }
}

// ---------------------------------------------------------------------------
// SpeechAudio
// ---------------------------------------------------------------------------

/// Playable mono 16-bit PCM produced by the TTS collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl SpeechAudio {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Decode raw little-endian 16-bit PCM bytes.  A trailing odd byte is
    /// dropped.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// CameraImage
// ---------------------------------------------------------------------------

/// Most recent encoded camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraImage {
    pub bytes: Arc<[u8]>,
    /// Monotonic capture time, used for freshness checks.
    pub captured_at: Instant,
    /// MIME type of `bytes`, e.g. `image/jpeg`.
    pub mime_type: String,
}

impl CameraImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            captured_at: Instant::now(),
            mime_type: mime_type.into(),
        }
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}
