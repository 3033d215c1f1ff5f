//! Voice-activity segmentation state machine.
//!
//! [`Segmenter`] turns a stream of classified audio frames into discrete
//! [`Utterance`]s.  It is pure: the caller supplies each frame, its
//! voiced/unvoiced classification, and the monotonic time it was read.
//!
//! ```text
//! Idle ──voiced──▶ Recording ──unvoiced──▶ Trailing ──voiced──▶ Recording
//!                                              │
//!                                              └─ silence >= max_silence ──▶ Idle
//!                                                   span >= min_sentence + max_silence → emit
//!                                                   otherwise                          → discard
//! ```
//!
//! Two thresholds work together: `max_silence` is how long a pause must last
//! before the recording is closed, `min_sentence` is how much speech must
//! precede that pause for the recording to be worth sending.

use std::time::{Duration, Instant};

use crate::audio::AudioFrame;
use crate::broker::Utterance;

// ---------------------------------------------------------------------------
// ListeningState
// ---------------------------------------------------------------------------

/// Externally visible phase of the segmenter.
///
/// `Trailing` is the `Recording` sub-state in which the silence timer is
/// running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningState {
    /// Not recording; unvoiced frames are ignored.
    #[default]
    Idle,
    /// Speech is being captured.
    Recording,
    /// Still recording, but the last frames were silent.
    Trailing,
}

impl ListeningState {
    /// `true` while an utterance buffer is open.
    ///
    /// ```
    /// use voice_robot::segmenter::ListeningState;
    ///
    /// assert!(!ListeningState::Idle.is_recording());
    /// assert!(ListeningState::Recording.is_recording());
    /// assert!(ListeningState::Trailing.is_recording());
    /// ```
    pub fn is_recording(&self) -> bool {
        matches!(self, ListeningState::Recording | ListeningState::Trailing)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ListeningState::Idle => "idle",
            ListeningState::Recording => "recording",
            ListeningState::Trailing => "trailing silence",
        }
    }
}

// ---------------------------------------------------------------------------
// SegmenterSettings
// ---------------------------------------------------------------------------

/// Thresholds driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterSettings {
    /// Silence that must persist before a recording is closed.
    pub max_silence: Duration,
    /// Minimum speech duration for a closed recording to be emitted.
    pub min_sentence: Duration,
    /// Sample rate of incoming frames, stamped on emitted utterances.
    pub sample_rate: u32,
}

impl SegmenterSettings {
    /// Shortest onset-to-close span that still produces an utterance.
    pub fn min_span(&self) -> Duration {
        self.min_sentence + self.max_silence
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What one frame did to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Idle and unvoiced: nothing happened.
    Ignored,
    /// Voice onset: a new buffer was opened with this frame.
    Started,
    /// Voiced frame appended; any silence timer was cleared.
    Appended,
    /// First unvoiced frame after speech: silence timer started.
    SilenceStarted,
    /// Unvoiced frame appended while the silence threshold is not yet met.
    Waiting,
    /// Recording closed and long enough.
    Emitted(Utterance),
    /// Recording closed but too short; buffer dropped.
    Discarded { span: Duration },
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// Buffers frames between voice onset and offset.
#[derive(Debug)]
pub struct Segmenter {
    settings: SegmenterSettings,
    samples: Vec<i16>,
    frames: usize,
    started_at: Option<Instant>,
    silence_since: Option<Instant>,
}

impl Segmenter {
    pub fn new(settings: SegmenterSettings) -> Self {
        Self {
            settings,
            samples: Vec::new(),
            frames: 0,
            started_at: None,
            silence_since: None,
        }
    }

    pub fn state(&self) -> ListeningState {
        match (self.started_at, self.silence_since) {
            (None, _) => ListeningState::Idle,
            (Some(_), None) => ListeningState::Recording,
            (Some(_), Some(_)) => ListeningState::Trailing,
        }
    }

    /// Frames buffered in the open recording.
    pub fn buffered_frames(&self) -> usize {
        self.frames
    }

    /// Advance the machine by one frame read at `now`.
    pub fn push(&mut self, frame: &AudioFrame, voiced: bool, now: Instant) -> Step {
        let Some(started_at) = self.started_at else {
            if !voiced {
                return Step::Ignored;
            }
            self.samples.clear();
            self.frames = 0;
            self.started_at = Some(now);
            self.silence_since = None;
            self.append(frame);
            return Step::Started;
        };

        if voiced {
            self.silence_since = None;
            self.append(frame);
            return Step::Appended;
        }

        let first_silent = self.silence_since.is_none();
        let silence_since = *self.silence_since.get_or_insert(now);
        if now.saturating_duration_since(silence_since) >= self.settings.max_silence {
            return self.finish(started_at, now);
        }

        self.append(frame);
        if first_silent {
            Step::SilenceStarted
        } else {
            Step::Waiting
        }
    }

    /// Drop any open recording without emitting it.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.frames = 0;
        self.started_at = None;
        self.silence_since = None;
    }

    fn append(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(frame.samples());
        self.frames += 1;
    }

    fn finish(&mut self, started_at: Instant, now: Instant) -> Step {
        let span = now.saturating_duration_since(started_at);
        let samples = std::mem::take(&mut self.samples);
        self.reset();

        if span >= self.settings.min_span() {
            Step::Emitted(Utterance::new(samples, self.settings.sample_rate, span))
        } else {
            Step::Discarded { span }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
