//! Voice-activity segmentation.
//!
//! * [`state`]: the pure, clock-injected [`Segmenter`] state machine.
//! * [`runner`]: [`SegmenterWorker`], which feeds it live frames and
//!   publishes results on the broker.

pub mod runner;
pub mod state;

pub use runner::SegmenterWorker;
pub use state::{ListeningState, Segmenter, SegmenterSettings, Step};
