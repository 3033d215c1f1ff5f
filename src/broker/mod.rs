//! In-process message broker shared by every component.
//!
//! The [`Broker`] owns a fixed, compile-time set of named FIFO channels and
//! shared variables.  Components never hold references to one another; they
//! only exchange data through the broker they were constructed with.
//!
//! # Architecture
//!
//! ```text
//! Segmenter ──▶ reasoning_requests ──▶ ReasoningWorker ──▶ functions_to_call ──▶ DispatchLoop
//!                                                    └──▶ tts_requests ──▶ TtsWorker ──▶ audio_to_play ──▶ DispatchLoop
//! DispatchLoop ──▶ remote_calls ──▶ NetworkClient ──▶ received_network_data
//! CameraWorker ──▶ [latest_camera_image]      Segmenter ──▶ [microphone_state]
//! every component ──▶ running_components (registration + readiness)
//! ```
//!
//! Each channel is addressed by a zero-sized key type implementing
//! [`ChannelKey`], which fixes its payload type:
//!
//! ```rust
//! use voice_robot::broker::{Broker, FunctionCall, FunctionsToCall};
//!
//! let broker = Broker::new();
//! broker.enqueue(FunctionsToCall, FunctionCall::new("next_mode"));
//! assert_eq!(broker.size(FunctionsToCall), 1);
//! assert_eq!(broker.dequeue(FunctionsToCall).unwrap().name, "next_mode");
//! assert!(broker.dequeue(FunctionsToCall).is_none());
//! ```
//!
//! # Locking
//!
//! One mutex per channel / variable, held only for a single operation.  The
//! one compound update is component registration: inserting into the
//! `already_counted` set, bumping the expected count and queueing the id on
//! `running_components` happen inside one registration critical section
//! (registration lock, then channel lock).

pub mod channel;
pub mod message;
pub mod readiness;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::segmenter::ListeningState;

pub use channel::{Channel, Variable};
pub use message::{
    CameraImage, ComponentId, FunctionCall, ReasoningRequest, SpeechAudio, Utterance,
};
pub use readiness::{ReadinessBarrier, ReadinessReport};

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Names of every channel the broker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    ReasoningRequests,
    TtsRequests,
    FunctionsToCall,
    AudioToPlay,
    RemoteCalls,
    ReceivedNetworkData,
    RunningComponents,
}

impl ChannelId {
    pub const ALL: [ChannelId; 7] = [
        ChannelId::ReasoningRequests,
        ChannelId::TtsRequests,
        ChannelId::FunctionsToCall,
        ChannelId::AudioToPlay,
        ChannelId::RemoteCalls,
        ChannelId::ReceivedNetworkData,
        ChannelId::RunningComponents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::ReasoningRequests => "reasoning_requests",
            ChannelId::TtsRequests => "tts_requests",
            ChannelId::FunctionsToCall => "functions_to_call",
            ChannelId::AudioToPlay => "audio_to_play",
            ChannelId::RemoteCalls => "remote_calls",
            ChannelId::ReceivedNetworkData => "received_network_data",
            ChannelId::RunningComponents => "running_components",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Typed address of one broker channel.
pub trait ChannelKey: Copy + Send + Sync + 'static {
    type Message: Clone + PartialEq + Send + 'static;

    const ID: ChannelId;

    fn channel(broker: &Broker) -> &Channel<Self::Message>;

    /// Deliver `message` to this channel.  Plain FIFO append unless the key
    /// attaches a side effect.
    fn deliver(broker: &Broker, message: Self::Message) {
        Self::channel(broker).push(message);
    }
}

/// Typed address of one broker variable.
pub trait VariableKey: Copy + Send + Sync + 'static {
    type Value: Clone + Send + 'static;

    const NAME: &'static str;

    fn variable(broker: &Broker) -> &Variable<Self::Value>;
}

macro_rules! channel_key {
    ($(#[$doc:meta])* $key:ident => $field:ident : $message:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $key;

        impl ChannelKey for $key {
            type Message = $message;
            const ID: ChannelId = ChannelId::$key;

            fn channel(broker: &Broker) -> &Channel<$message> {
                &broker.$field
            }
        }
    };
}

macro_rules! variable_key {
    ($(#[$doc:meta])* $key:ident => $field:ident : $value:ty, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $key;

        impl VariableKey for $key {
            type Value = $value;
            const NAME: &'static str = $name;

            fn variable(broker: &Broker) -> &Variable<$value> {
                &broker.$field
            }
        }
    };
}

channel_key!(
    /// Finished utterances awaiting the reasoning service.
    ReasoningRequests => reasoning_requests: ReasoningRequest
);
channel_key!(
    /// Text awaiting speech synthesis.
    TtsRequests => tts_requests: String
);
channel_key!(
    /// Function calls returned by the reasoning service.
    FunctionsToCall => functions_to_call: FunctionCall
);
channel_key!(
    /// Synthesised speech awaiting playback.
    AudioToPlay => audio_to_play: SpeechAudio
);
channel_key!(
    /// Function calls to forward to the actuator board over the network.
    RemoteCalls => remote_calls: FunctionCall
);
channel_key!(
    /// Raw JSON payloads received from the actuator board.
    ReceivedNetworkData => received_network_data: String
);

/// Components currently running.  Enqueueing here registers the component
/// (see [`Broker::expected_component_number`]).
#[derive(Debug, Clone, Copy)]
pub struct RunningComponents;

impl ChannelKey for RunningComponents {
    type Message = ComponentId;
    const ID: ChannelId = ChannelId::RunningComponents;

    fn channel(broker: &Broker) -> &Channel<ComponentId> {
        &broker.running_components
    }

    fn deliver(broker: &Broker, id: ComponentId) {
        broker.register_running(id);
    }
}

variable_key!(
    /// Latest frame published by the camera worker.
    LatestCameraImage => latest_camera_image: CameraImage, "latest_camera_image"
);
variable_key!(
    /// Current segmenter state, mirrored to the status LED.
    MicrophoneState => microphone_state: ListeningState, "microphone_state"
);

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Registration {
    already_counted: BTreeSet<ComponentId>,
    expected: usize,
}

/// Thread-safe registry of channels and shared variables.
///
/// Construct one per process, wrap it in an `Arc`, and pass a clone to every
/// component constructor.
#[derive(Debug, Default)]
pub struct Broker {
    reasoning_requests: Channel<ReasoningRequest>,
    tts_requests: Channel<String>,
    functions_to_call: Channel<FunctionCall>,
    audio_to_play: Channel<SpeechAudio>,
    remote_calls: Channel<FunctionCall>,
    received_network_data: Channel<String>,
    running_components: Channel<ComponentId>,

    latest_camera_image: Variable<CameraImage>,
    microphone_state: Variable<ListeningState>,

    registration: Mutex<Registration>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    /// Append `message` to the tail of `key`'s channel.
    pub fn enqueue<K: ChannelKey>(&self, _key: K, message: K::Message) {
        K::deliver(self, message);
    }

    /// Pop the head of `key`'s channel without blocking.
    pub fn dequeue<K: ChannelKey>(&self, _key: K) -> Option<K::Message> {
        K::channel(self).pop()
    }

    /// Pop the head of `key`'s channel, waiting at most `timeout`.
    pub fn dequeue_timeout<K: ChannelKey>(&self, _key: K, timeout: Duration) -> Option<K::Message> {
        K::channel(self).pop_timeout(timeout)
    }

    /// Remove the first value-equal `message`.  Removing from
    /// `running_components` never changes the expected component count.
    pub fn remove<K: ChannelKey>(&self, _key: K, message: &K::Message) -> bool {
        K::channel(self).remove(message)
    }

    pub fn contains<K: ChannelKey>(&self, _key: K, message: &K::Message) -> bool {
        K::channel(self).contains(message)
    }

    pub fn size<K: ChannelKey>(&self, _key: K) -> usize {
        K::channel(self).len()
    }

    pub fn snapshot<K: ChannelKey>(&self, _key: K) -> Vec<K::Message> {
        K::channel(self).snapshot()
    }

    /// Queue depth of every channel, in [`ChannelId::ALL`] order.
    pub fn sizes(&self) -> Vec<(ChannelId, usize)> {
        ChannelId::ALL
            .iter()
            .map(|&id| {
                let len = match id {
                    ChannelId::ReasoningRequests => self.reasoning_requests.len(),
                    ChannelId::TtsRequests => self.tts_requests.len(),
                    ChannelId::FunctionsToCall => self.functions_to_call.len(),
                    ChannelId::AudioToPlay => self.audio_to_play.len(),
                    ChannelId::RemoteCalls => self.remote_calls.len(),
                    ChannelId::ReceivedNetworkData => self.received_network_data.len(),
                    ChannelId::RunningComponents => self.running_components.len(),
                };
                (id, len)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    pub fn set<V: VariableKey>(&self, _key: V, value: V::Value) {
        V::variable(self).set(value);
    }

    pub fn get<V: VariableKey>(&self, _key: V) -> Option<V::Value> {
        V::variable(self).get()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Number of distinct components that have ever registered as running.
    pub fn expected_component_number(&self) -> usize {
        self.lock_registration().expected
    }

    /// Every component id that has ever registered, sorted.
    pub fn already_counted_components(&self) -> Vec<ComponentId> {
        self.lock_registration()
            .already_counted
            .iter()
            .cloned()
            .collect()
    }

    /// Count `id` as expected before its thread has started.
    ///
    /// A component announced this way that never reaches
    /// [`register_running`](Self::register_running) shows up as missing at
    /// the readiness barrier instead of going unnoticed.  Returns `false` if
    /// `id` was already counted.
    pub fn expect_component(&self, id: ComponentId) -> bool {
        let mut registration = self.lock_registration();
        let first_time = registration.already_counted.insert(id.clone());
        if first_time {
            registration.expected += 1;
            log::debug!("broker: component '{id}' expected");
        }
        first_time
    }

    /// Announce `id` as running.  Equivalent to
    /// `enqueue(RunningComponents, id)`.
    pub fn register_running(&self, id: ComponentId) {
        let mut registration = self.lock_registration();
        let first_time = registration.already_counted.insert(id.clone());
        if first_time {
            registration.expected += 1;
        }
        debug_assert_eq!(registration.expected, registration.already_counted.len());

        let queued = self.running_components.push_unique(id.clone());
        drop(registration);

        match (first_time, queued) {
            (true, _) => log::info!("broker: component '{id}' registered"),
            (false, true) => log::info!("broker: component '{id}' running again"),
            (false, false) => log::debug!("broker: component '{id}' already running"),
        }
    }

    /// Retract `id` from `running_components`.  Equivalent to
    /// `remove(RunningComponents, &id)`.
    pub fn deregister_running(&self, id: &ComponentId) -> bool {
        let removed = self.running_components.remove(id);
        if removed {
            log::info!("broker: component '{id}' stopped running");
        }
        removed
    }

    fn lock_registration(&self) -> MutexGuard<'_, Registration> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
