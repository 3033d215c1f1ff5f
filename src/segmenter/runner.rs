//! Segmenter worker: microphone frames in, utterances onto the broker.
//!
//! [`SegmenterWorker`] owns a [`FrameSource`], a [`VoiceClassifier`] and the
//! pure [`Segmenter`] machine.  Each loop iteration:
//!
//! ```text
//! read_frame (blocking, bounded by the source's timeout)
//!   ├─ None  → Poll::Idle
//!   └─ frame → classify → Segmenter::push(frame time)
//!                ├─ publish ListeningState on change  [microphone_state]
//!                ├─ Emitted   → enqueue               [reasoning_requests]
//!                │              + optional debug WAV
//!                └─ Discarded → debug log
//! ```
//!
//! Frame times come from the sample stream, not from when a frame happened to
//! be processed: the first frame anchors the clock and every later frame is
//! placed `samples_so_far / sample_rate` after it.  A backlog drained in a
//! burst therefore still measures silence and utterance length in audio time.
//!
//! The worker registers as `microphone_listener` before its first read and
//! deregisters when the loop ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioFrame, FrameSource, RecordingWriter, VoiceClassifier};
use crate::broker::{Broker, ComponentId, MicrophoneState, ReasoningRequests, Utterance};
use crate::worker::{run_polling_loop, Poll, PollPolicy, StopToken};

use super::state::{ListeningState, Segmenter, SegmenterSettings, Step};

/// Component id announced on `running_components`.
pub const COMPONENT_ID: &str = "microphone_listener";

// ---------------------------------------------------------------------------
// FrameClock
// ---------------------------------------------------------------------------

/// Stamps frames by their position in the sample stream.
#[derive(Debug, Default)]
struct FrameClock {
    origin: Option<Instant>,
    samples: u64,
}

impl FrameClock {
    /// Start time of the next frame, then advance past its `len` samples.
    /// `arrived` anchors the clock on the first frame.
    fn stamp(&mut self, len: usize, sample_rate: u32, arrived: Instant) -> Instant {
        let origin = *self.origin.get_or_insert(arrived);
        let at = origin + samples_to_duration(self.samples, sample_rate);
        self.samples += len as u64;
        at
    }
}

fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    Duration::from_secs(samples / rate)
        + Duration::from_nanos((samples % rate) * 1_000_000_000 / rate)
}

// ---------------------------------------------------------------------------
// SegmenterWorker
// ---------------------------------------------------------------------------

pub struct SegmenterWorker<S, C> {
    broker: Arc<Broker>,
    source: S,
    classifier: C,
    machine: Segmenter,
    recorder: Option<RecordingWriter>,
    published: Option<ListeningState>,
    clock: FrameClock,
}

impl<S: FrameSource, C: VoiceClassifier> SegmenterWorker<S, C> {
    /// `settings.sample_rate` is overridden by the source's rate.
    pub fn new(broker: Arc<Broker>, source: S, classifier: C, settings: SegmenterSettings) -> Self {
        let settings = SegmenterSettings {
            sample_rate: source.sample_rate(),
            ..settings
        };
        Self {
            broker,
            source,
            classifier,
            machine: Segmenter::new(settings),
            recorder: None,
            published: None,
            clock: FrameClock::default(),
        }
    }

    /// Also write every accepted utterance to disk.
    pub fn with_recorder(mut self, recorder: RecordingWriter) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Register, run until `stop`, deregister.
    pub fn run(mut self, stop: &StopToken, policy: PollPolicy) {
        let id = ComponentId::new(COMPONENT_ID);
        self.broker.register_running(id.clone());
        self.publish_state();

        run_polling_loop("segmenter", stop, policy, || self.step());

        self.machine.reset();
        self.publish_state();
        self.broker.deregister_running(&id);
    }

    /// Read and process one frame.
    pub fn step(&mut self) -> anyhow::Result<Poll> {
        match self.source.read_frame()? {
            Some(frame) => {
                let voiced = self.classifier.is_voiced(&frame);
                let at = self
                    .clock
                    .stamp(frame.len(), frame.sample_rate(), Instant::now());
                self.process(&frame, voiced, at);
                Ok(Poll::Busy)
            }
            None => Ok(Poll::Idle),
        }
    }

    fn process(&mut self, frame: &AudioFrame, voiced: bool, now: Instant) {
        match self.machine.push(frame, voiced, now) {
            Step::Started => log::debug!("segmenter: voice onset"),
            Step::Emitted(utterance) => self.emit(utterance),
            Step::Discarded { span } => {
                log::debug!("segmenter: discarded {:.2}s blip", span.as_secs_f32());
            }
            Step::SilenceStarted => log::trace!(
                "segmenter: trailing silence after {} frames",
                self.machine.buffered_frames()
            ),
            Step::Ignored | Step::Appended | Step::Waiting => {}
        }
        self.publish_state();
    }

    fn emit(&mut self, utterance: Utterance) {
        log::info!(
            "segmenter: utterance of {:.2}s ({} samples)",
            utterance.span().as_secs_f32(),
            utterance.samples().len()
        );

        if let Some(recorder) = &self.recorder {
            match recorder.save(&utterance) {
                Ok(path) => log::debug!("segmenter: saved {}", path.display()),
                Err(e) => log::warn!("segmenter: could not save recording: {e}"),
            }
        }

        self.broker.enqueue(ReasoningRequests, utterance.into());
    }

    fn publish_state(&mut self) {
        let state = self.machine.state();
        if self.published != Some(state) {
            log::debug!("segmenter: {}", state.label());
            self.broker.set(MicrophoneState, state);
            self.published = Some(state);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureError, EnergyVad};
    use crate::broker::RunningComponents;
    use std::collections::VecDeque;

    /// Replays scripted frames, then reports timeouts.
    struct ScriptedSource {
        frames: VecDeque<AudioFrame>,
    }

    impl ScriptedSource {
        fn new(pattern: &[bool]) -> Self {
            let frames = pattern
                .iter()
                .map(|&voiced| AudioFrame::new(vec![if voiced { 12_000 } else { 0 }; 160], 16_000))
                .collect();
            Self { frames }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError> {
            Ok(self.frames.pop_front())
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError> {
            Err(CaptureError::Disconnected)
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    fn settings() -> SegmenterSettings {
        SegmenterSettings {
            max_silence: Duration::from_millis(500),
            min_sentence: Duration::from_millis(300),
            sample_rate: 0,
        }
    }

    /// Drive the worker with synthetic 100 ms frame times.
    fn drive(worker: &mut SegmenterWorker<ScriptedSource, EnergyVad>, frames: usize) {
        let base = Instant::now();
        for i in 0..frames {
            let frame = worker.source.read_frame().unwrap().unwrap();
            let voiced = worker.classifier.is_voiced(&frame);
            worker.process(&frame, voiced, base + Duration::from_millis(i as u64 * 100));
        }
    }

    #[test]
    fn emitted_utterance_lands_on_reasoning_requests() {
        let broker = Arc::new(Broker::new());
        let mut pattern = vec![true; 5];
        pattern.extend([false; 6]);
        let mut worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&pattern),
            EnergyVad::new(0.05),
            settings(),
        );

        drive(&mut worker, pattern.len());

        assert_eq!(broker.size(ReasoningRequests), 1);
        let request = broker.dequeue(ReasoningRequests).unwrap();
        assert_eq!(request.utterance.sample_rate(), 16_000);
        assert_eq!(request.utterance.samples().len(), 10 * 160);
        assert!(request.image.is_none());
        assert_eq!(broker.get(MicrophoneState), Some(ListeningState::Idle));
    }

    #[test]
    fn short_blip_enqueues_nothing() {
        let broker = Arc::new(Broker::new());
        let mut pattern = vec![true];
        pattern.extend([false; 6]);
        let mut worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&pattern),
            EnergyVad::new(0.05),
            settings(),
        );

        drive(&mut worker, pattern.len());

        assert_eq!(broker.size(ReasoningRequests), 0);
    }

    #[test]
    fn listening_state_is_published() {
        let broker = Arc::new(Broker::new());
        let mut worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&[true, false]),
            EnergyVad::new(0.05),
            settings(),
        );

        drive(&mut worker, 1);
        assert_eq!(broker.get(MicrophoneState), Some(ListeningState::Recording));
        drive(&mut worker, 1);
        assert_eq!(broker.get(MicrophoneState), Some(ListeningState::Trailing));
    }

    #[test]
    fn accepted_utterances_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let mut pattern = vec![true; 5];
        pattern.extend([false; 6]);
        let mut worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&pattern),
            EnergyVad::new(0.05),
            settings(),
        )
        .with_recorder(RecordingWriter::new(dir.path()));

        drive(&mut worker, pattern.len());

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn silence_is_measured_in_audio_time() {
        // 10 ms frames processed back to back: wall time barely moves, but
        // 50 ms of audio silence still closes the utterance.
        let broker = Arc::new(Broker::new());
        let mut pattern = vec![true; 5];
        pattern.extend([false; 6]);
        let mut worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&pattern),
            EnergyVad::new(0.05),
            SegmenterSettings {
                max_silence: Duration::from_millis(50),
                min_sentence: Duration::from_millis(30),
                sample_rate: 0,
            },
        );

        for _ in 0..pattern.len() {
            assert_eq!(worker.step().unwrap(), Poll::Busy);
        }

        let request = broker.dequeue(ReasoningRequests).unwrap();
        assert_eq!(request.utterance.samples().len(), 10 * 160);
        assert_eq!(request.utterance.span(), Duration::from_millis(100));
    }

    #[test]
    fn frame_clock_follows_sample_position() {
        let mut clock = FrameClock::default();
        let anchor = Instant::now();
        let late = anchor + Duration::from_secs(3);

        assert_eq!(clock.stamp(160, 16_000, anchor), anchor);
        assert_eq!(clock.stamp(160, 16_000, late), anchor + Duration::from_millis(10));
        assert_eq!(clock.stamp(8_000, 16_000, late), anchor + Duration::from_millis(20));
        assert_eq!(clock.stamp(160, 16_000, late), anchor + Duration::from_millis(520));
        assert_eq!(samples_to_duration(1, 3), Duration::from_nanos(333_333_333));
    }

    #[test]
    fn timeout_is_idle_and_errors_propagate() {
        let broker = Arc::new(Broker::new());
        let mut idle = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&[]),
            EnergyVad::new(0.05),
            settings(),
        );
        assert_eq!(idle.step().unwrap(), Poll::Idle);

        let mut failing =
            SegmenterWorker::new(broker, FailingSource, EnergyVad::new(0.05), settings());
        assert!(failing.step().is_err());
    }

    #[test]
    fn run_registers_and_deregisters() {
        let broker = Arc::new(Broker::new());
        let worker = SegmenterWorker::new(
            Arc::clone(&broker),
            ScriptedSource::new(&[]),
            EnergyVad::new(0.05),
            settings(),
        );
        let stop = StopToken::new();

        let observer = Arc::clone(&broker);
        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            while observer.size(RunningComponents) == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
            remote.stop();
        });

        worker.run(&stop, PollPolicy::new(Duration::from_millis(1), Duration::ZERO));
        handle.join().unwrap();

        assert_eq!(broker.expected_component_number(), 1);
        assert_eq!(broker.size(RunningComponents), 0);
        assert_eq!(
            broker.already_counted_components(),
            vec![ComponentId::from(COMPONENT_ID)]
        );
    }
}
