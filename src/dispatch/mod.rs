//! Result dispatch loop, run on the supervisor's main thread.
//!
//! ```text
//! loop until stopped:
//!   [microphone_state] changed?   → FunctionSink::show_listening_state
//!   functions_to_call  (≤ 1 msg)  → FunctionSink::execute
//!   audio_to_play      (≤ 1 msg)  → AudioSink::play   (blocks for the clip)
//!   nothing dequeued → idle sleep, else busy yield
//! ```
//!
//! A failing sink is logged and the loop moves on to the next channel.  When
//! the loop stops, [`FunctionSink::shutdown`] silences the actuators.

pub mod router;

use std::sync::Arc;
use std::time::Duration;

use crate::audio::SpeakerSink;
use crate::broker::{
    AudioToPlay, Broker, FunctionCall, FunctionsToCall, MicrophoneState, SpeechAudio,
};
use crate::config::DispatchConfig;
use crate::segmenter::ListeningState;
use crate::worker::{run_polling_loop, Poll, PollPolicy, StopToken};

pub use router::{listening_colour, ActuatorRouter};

/// Executes function calls and shows listening feedback.
pub trait FunctionSink {
    fn execute(&mut self, call: FunctionCall) -> anyhow::Result<()>;

    fn show_listening_state(&mut self, _state: ListeningState) {}

    /// Called once after the loop stops.
    fn shutdown(&mut self) {}
}

/// Plays synthesised speech.
pub trait AudioSink {
    fn play(&mut self, audio: &SpeechAudio) -> anyhow::Result<()>;
}

impl AudioSink for SpeakerSink {
    fn play(&mut self, audio: &SpeechAudio) -> anyhow::Result<()> {
        SpeakerSink::play(self, audio)?;
        Ok(())
    }
}

/// Drops audio, for headless runs or hosts without an output device.
#[derive(Debug, Default)]
pub struct MutedSpeaker;

impl AudioSink for MutedSpeaker {
    fn play(&mut self, audio: &SpeechAudio) -> anyhow::Result<()> {
        log::info!(
            "dispatch: playback disabled, dropping {:.1}s of speech",
            audio.duration().as_secs_f32()
        );
        Ok(())
    }
}

impl AudioSink for Box<dyn AudioSink> {
    fn play(&mut self, audio: &SpeechAudio) -> anyhow::Result<()> {
        (**self).play(audio)
    }
}

// ---------------------------------------------------------------------------
// DispatchLoop
// ---------------------------------------------------------------------------

pub struct DispatchLoop<F, A> {
    broker: Arc<Broker>,
    functions: F,
    audio: A,
    policy: PollPolicy,
    shown: Option<ListeningState>,
}

impl<F: FunctionSink, A: AudioSink> DispatchLoop<F, A> {
    pub fn new(broker: Arc<Broker>, functions: F, audio: A, config: &DispatchConfig) -> Self {
        Self {
            broker,
            functions,
            audio,
            policy: PollPolicy::new(
                Duration::from_millis(config.idle_sleep_ms),
                Duration::from_millis(config.busy_yield_ms),
            ),
            shown: None,
        }
    }

    pub fn run(mut self, stop: &StopToken) {
        let policy = self.policy;
        run_polling_loop("dispatch", stop, policy, || self.step());
        self.functions.shutdown();
    }

    /// One iteration: at most one message from each result channel.
    pub fn step(&mut self) -> anyhow::Result<Poll> {
        self.mirror_listening_state();

        let mut dispatched = false;

        if let Some(call) = self.broker.dequeue(FunctionsToCall) {
            dispatched = true;
            let name = call.name.clone();
            if let Err(e) = self.functions.execute(call) {
                log::warn!("dispatch: function '{name}' failed: {e:#}");
            }
        }

        if let Some(audio) = self.broker.dequeue(AudioToPlay) {
            dispatched = true;
            if let Err(e) = self.audio.play(&audio) {
                log::warn!("dispatch: playback failed: {e:#}");
            }
        }

        Ok(if dispatched { Poll::Busy } else { Poll::Idle })
    }

    fn mirror_listening_state(&mut self) {
        let state = self.broker.get(MicrophoneState).unwrap_or_default();
        if self.shown != Some(state) {
            log::debug!("dispatch: microphone {}", state.label());
            self.functions.show_listening_state(state);
            self.shown = Some(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingFunctions {
        calls: Vec<String>,
        states: Vec<ListeningState>,
        fail: bool,
    }

    impl FunctionSink for RecordingFunctions {
        fn execute(&mut self, call: FunctionCall) -> anyhow::Result<()> {
            self.calls.push(call.name);
            if self.fail {
                anyhow::bail!("actuator offline");
            }
            Ok(())
        }

        fn show_listening_state(&mut self, state: ListeningState) {
            self.states.push(state);
        }
    }

    #[derive(Default)]
    struct RecordingAudio {
        clips: Vec<usize>,
    }

    impl AudioSink for RecordingAudio {
        fn play(&mut self, audio: &SpeechAudio) -> anyhow::Result<()> {
            self.clips.push(audio.samples().len());
            Ok(())
        }
    }

    fn dispatch_loop(
        functions: RecordingFunctions,
    ) -> (Arc<Broker>, DispatchLoop<RecordingFunctions, RecordingAudio>) {
        let broker = Arc::new(Broker::new());
        let dispatch = DispatchLoop::new(
            Arc::clone(&broker),
            functions,
            RecordingAudio::default(),
            &DispatchConfig::default(),
        );
        (broker, dispatch)
    }

    #[test]
    fn drains_at_most_one_message_per_channel() {
        let (broker, mut dispatch) = dispatch_loop(RecordingFunctions::default());
        broker.enqueue(FunctionsToCall, FunctionCall::new("next_mode"));
        broker.enqueue(FunctionsToCall, FunctionCall::new("set_target"));
        broker.enqueue(AudioToPlay, SpeechAudio::new(vec![0; 10], 24_000));

        assert_eq!(dispatch.step().unwrap(), Poll::Busy);
        assert_eq!(dispatch.functions.calls, vec!["next_mode"]);
        assert_eq!(dispatch.audio.clips, vec![10]);
        assert_eq!(broker.size(FunctionsToCall), 1);

        assert_eq!(dispatch.step().unwrap(), Poll::Busy);
        assert_eq!(dispatch.functions.calls, vec!["next_mode", "set_target"]);
        assert_eq!(dispatch.step().unwrap(), Poll::Idle);
    }

    #[test]
    fn failing_function_does_not_block_audio() {
        let (broker, mut dispatch) = dispatch_loop(RecordingFunctions {
            fail: true,
            ..Default::default()
        });
        broker.enqueue(FunctionsToCall, FunctionCall::new("move_arm"));
        broker.enqueue(AudioToPlay, SpeechAudio::new(vec![0; 4], 24_000));

        assert_eq!(dispatch.step().unwrap(), Poll::Busy);
        assert_eq!(dispatch.audio.clips, vec![4]);
    }

    #[test]
    fn listening_state_is_shown_on_change_only() {
        let (broker, mut dispatch) = dispatch_loop(RecordingFunctions::default());
        dispatch.step().unwrap();
        dispatch.step().unwrap();
        broker.set(MicrophoneState, ListeningState::Recording);
        dispatch.step().unwrap();
        broker.set(MicrophoneState, ListeningState::Trailing);
        dispatch.step().unwrap();
        dispatch.step().unwrap();

        assert_eq!(
            dispatch.functions.states,
            vec![
                ListeningState::Idle,
                ListeningState::Recording,
                ListeningState::Trailing
            ]
        );
    }

    #[test]
    fn run_exits_when_stopped() {
        let (broker, dispatch) = dispatch_loop(RecordingFunctions::default());
        broker.enqueue(FunctionsToCall, FunctionCall::new("next_mode"));

        let stop = StopToken::new();
        let remote = stop.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.stop();
        });
        dispatch.run(&stop);
        stopper.join().unwrap();
        assert_eq!(broker.size(FunctionsToCall), 0);
    }

    #[test]
    fn stopped_loop_shuts_the_sink_down() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Flagged(Arc<AtomicBool>);

        impl FunctionSink for Flagged {
            fn execute(&mut self, _call: FunctionCall) -> anyhow::Result<()> {
                Ok(())
            }

            fn shutdown(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let flag = Arc::new(AtomicBool::new(false));
        let dispatch = DispatchLoop::new(
            Arc::new(Broker::new()),
            Flagged(Arc::clone(&flag)),
            RecordingAudio::default(),
            &DispatchConfig::default(),
        );
        let stop = StopToken::new();
        stop.stop();
        dispatch.run(&stop);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn muted_speaker_accepts_audio() {
        let mut muted = MutedSpeaker;
        assert!(muted.play(&SpeechAudio::new(vec![0; 24_000], 24_000)).is_ok());
    }
}
