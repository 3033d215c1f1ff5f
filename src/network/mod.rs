//! Link to the actuator board controller over TCP.

pub mod client;
pub mod codec;

pub use client::{NetworkClient, NetworkError};
pub use codec::{encode_frame, read_frame, write_frame, FrameError};
