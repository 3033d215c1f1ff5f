//! Voice-operated robot controller.
//!
//! Independent components exchange messages through one shared
//! [`broker::Broker`] and run on their own threads:
//!
//! | Module        | Component                                          |
//! |---------------|----------------------------------------------------|
//! | [`segmenter`] | microphone frames → utterances                     |
//! | [`cloud`]     | utterances → function calls + speech               |
//! | [`dispatch`]  | function calls → actuators, speech → speaker       |
//! | [`network`]   | remote function calls ↔ actuator board controller  |
//! | [`camera`]    | latest scene image for the reasoning requests      |

pub mod audio;
pub mod broker;
pub mod camera;
pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod hardware;
pub mod network;
pub mod segmenter;
pub mod worker;
