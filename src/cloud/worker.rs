//! Threads that drive the cloud collaborators from broker channels.
//!
//! ```text
//! reasoning_requests ──▶ ReasoningWorker ──▶ functions_to_call (each call)
//!                         + latest_camera_image   └──▶ tts_requests (text)
//! tts_requests ──▶ TtsWorker ──▶ audio_to_play
//! ```
//!
//! Each worker owns a current-thread tokio runtime and `block_on`s one
//! request per iteration, so the rest of the system stays thread-per-component.
//! Waiting for work uses `dequeue_timeout`, so an idle worker wakes as soon as
//! a message arrives.  A failed request is logged and dropped.  After a
//! transient failure (rate limit, timeout, server error) the worker backs off
//! for [`TRANSIENT_BACKOFF`] and leaves queued requests in place meanwhile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Runtime};

use super::{CloudError, ReasoningService, SpeechSynthesizer};
use crate::broker::{
    AudioToPlay, Broker, ComponentId, FunctionsToCall, LatestCameraImage, ReasoningRequest,
    ReasoningRequests, TtsRequests,
};
use crate::worker::{run_polling_loop, Poll, PollPolicy, StopToken};

pub const REASONING_COMPONENT: &str = "reasoning_service";
pub const TTS_COMPONENT: &str = "tts_service";

/// Yield between requests; the dequeue wait already covers the idle case.
const POLICY: PollPolicy = PollPolicy {
    idle_sleep: Duration::ZERO,
    busy_yield: Duration::from_millis(20),
};

/// Pause after a transient cloud failure before taking the next request.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);

/// Backoff window opened by transient failures.
#[derive(Debug, Default)]
struct Cooldown {
    until: Option<Instant>,
}

impl Cooldown {
    /// Sleep through part of an open window.  `true` while it is still open.
    fn wait(&mut self, step: Duration) -> bool {
        let Some(until) = self.until else {
            return false;
        };
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            self.until = None;
            return false;
        }
        std::thread::sleep(remaining.min(step));
        true
    }

    /// Inspect a failed request; returns the error for the polling loop.
    fn record(&mut self, component: &str, error: CloudError) -> anyhow::Error {
        if error.is_transient() {
            log::info!(
                "{component}: transient failure, pausing {:.1}s",
                TRANSIENT_BACKOFF.as_secs_f32()
            );
            self.until = Some(Instant::now() + TRANSIENT_BACKOFF);
        }
        error.into()
    }
}

fn current_thread_runtime() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Register `id`, run `body` in a polling loop, deregister.
fn run_registered<F>(broker: &Broker, id: &str, stop: &StopToken, body: F)
where
    F: FnMut() -> anyhow::Result<Poll>,
{
    let id = ComponentId::new(id);
    broker.register_running(id.clone());
    run_polling_loop(id.as_str(), stop, POLICY, body);
    broker.deregister_running(&id);
}

// ---------------------------------------------------------------------------
// ReasoningWorker
// ---------------------------------------------------------------------------

pub struct ReasoningWorker<R> {
    broker: Arc<Broker>,
    service: R,
    runtime: Runtime,
    wait: Duration,
    max_image_age: Duration,
    cooldown: Cooldown,
}

impl<R: ReasoningService> ReasoningWorker<R> {
    /// `wait` bounds each blocking dequeue.  Images older than
    /// `max_image_age` are not attached; zero disables attachment.
    pub fn new(
        broker: Arc<Broker>,
        service: R,
        wait: Duration,
        max_image_age: Duration,
    ) -> std::io::Result<Self> {
        Ok(Self {
            broker,
            service,
            runtime: current_thread_runtime()?,
            wait,
            max_image_age,
            cooldown: Cooldown::default(),
        })
    }

    pub fn run(mut self, stop: &StopToken) {
        let broker = Arc::clone(&self.broker);
        run_registered(&broker, REASONING_COMPONENT, stop, || self.step());
    }

    /// Handle at most one request.
    pub fn step(&mut self) -> anyhow::Result<Poll> {
        if self.cooldown.wait(self.wait) {
            return Ok(Poll::Idle);
        }
        let Some(request) = self.broker.dequeue_timeout(ReasoningRequests, self.wait) else {
            return Ok(Poll::Idle);
        };
        let request = self.with_fresh_image(request);

        log::debug!(
            "reasoning_service: sending {:.2}s of audio{}",
            request.utterance.audio_duration().as_secs_f32(),
            if request.image.is_some() { " + image" } else { "" }
        );
        let reply = match self.runtime.block_on(self.service.reason(&request)) {
            Ok(reply) => reply,
            Err(e) => return Err(self.cooldown.record(REASONING_COMPONENT, e)),
        };

        if reply.is_empty() {
            log::info!("reasoning_service: empty reply");
        }
        for call in reply.function_calls {
            log::info!("reasoning_service: function call '{}'", call.name);
            self.broker.enqueue(FunctionsToCall, call);
        }
        if let Some(text) = reply.text {
            log::info!("reasoning_service: reply \"{text}\"");
            self.broker.enqueue(TtsRequests, text);
        }
        Ok(Poll::Busy)
    }

    fn with_fresh_image(&self, mut request: ReasoningRequest) -> ReasoningRequest {
        if request.image.is_none() && !self.max_image_age.is_zero() {
            request.image = self
                .broker
                .get(LatestCameraImage)
                .filter(|image| image.age() <= self.max_image_age);
        }
        request
    }
}

// ---------------------------------------------------------------------------
// TtsWorker
// ---------------------------------------------------------------------------

pub struct TtsWorker<S> {
    broker: Arc<Broker>,
    synthesizer: S,
    runtime: Runtime,
    wait: Duration,
    cooldown: Cooldown,
}

impl<S: SpeechSynthesizer> TtsWorker<S> {
    pub fn new(broker: Arc<Broker>, synthesizer: S, wait: Duration) -> std::io::Result<Self> {
        Ok(Self {
            broker,
            synthesizer,
            runtime: current_thread_runtime()?,
            wait,
            cooldown: Cooldown::default(),
        })
    }

    pub fn run(mut self, stop: &StopToken) {
        let broker = Arc::clone(&self.broker);
        run_registered(&broker, TTS_COMPONENT, stop, || self.step());
    }

    /// Synthesise at most one text.
    pub fn step(&mut self) -> anyhow::Result<Poll> {
        if self.cooldown.wait(self.wait) {
            return Ok(Poll::Idle);
        }
        let Some(text) = self.broker.dequeue_timeout(TtsRequests, self.wait) else {
            return Ok(Poll::Idle);
        };
        if text.trim().is_empty() {
            return Ok(Poll::Busy);
        }

        let audio = match self.runtime.block_on(self.synthesizer.synthesize(&text)) {
            Ok(audio) => audio,
            Err(e) => return Err(self.cooldown.record(TTS_COMPONENT, e)),
        };
        log::debug!(
            "tts_service: {:.2}s of speech for {} chars",
            audio.duration().as_secs_f32(),
            text.chars().count()
        );
        self.broker.enqueue(AudioToPlay, audio);
        Ok(Poll::Busy)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
