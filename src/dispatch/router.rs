//! Where each function call goes.
//!
//! | Call        | Destination                                     |
//! |-------------|-------------------------------------------------|
//! | `beep`      | local buzzer on the arm board                   |
//! | anything    | `remote_calls` when the network link is enabled |
//! | else        | logged as unhandled                             |

use std::sync::Arc;
use std::time::Duration;

use super::FunctionSink;
use crate::broker::{Broker, FunctionCall, RemoteCalls};
use crate::cloud::declarations::{self, BEEP};
use crate::hardware::{ArmBoard, RegisterBus};
use crate::segmenter::ListeningState;

const MAX_BEEP_SECS: f64 = 5.0;

/// LED colour for a listening state: red idle, green voice, orange trailing.
pub fn listening_colour(state: ListeningState, intensity: u8) -> (u8, u8, u8) {
    match state {
        ListeningState::Idle => (intensity, 0, 0),
        ListeningState::Recording => (0, intensity, 0),
        ListeningState::Trailing => (intensity, intensity, 0),
    }
}

pub struct ActuatorRouter<B: RegisterBus> {
    broker: Arc<Broker>,
    board: ArmBoard<B>,
    forward_remote: bool,
    led_intensity: u8,
}

impl<B: RegisterBus> ActuatorRouter<B> {
    /// `forward_remote` is set when the network client runs.
    pub fn new(
        broker: Arc<Broker>,
        board: ArmBoard<B>,
        forward_remote: bool,
        led_intensity: u8,
    ) -> Self {
        Self {
            broker,
            board,
            forward_remote,
            led_intensity,
        }
    }

    fn beep(&mut self, call: &FunctionCall) -> anyhow::Result<()> {
        let seconds = call
            .f64_arg("seconds")
            .ok_or_else(|| anyhow::anyhow!("beep without numeric 'seconds'"))?;
        if !seconds.is_finite() || seconds < 0.0 {
            anyhow::bail!("beep with invalid duration {seconds}");
        }
        let duration = Duration::from_secs_f64(seconds.min(MAX_BEEP_SECS));
        log::info!("dispatch: beep {:.1}s", duration.as_secs_f32());
        self.board.buzzer_on(duration);
        Ok(())
    }
}

impl<B: RegisterBus> FunctionSink for ActuatorRouter<B> {
    fn execute(&mut self, call: FunctionCall) -> anyhow::Result<()> {
        if call.name == BEEP {
            return self.beep(&call);
        }

        if !declarations::is_declared(&call.name) {
            log::warn!("dispatch: '{}' is not a declared robot function", call.name);
        }
        if self.forward_remote {
            log::debug!("dispatch: forwarding '{}'", call.name);
            self.broker.enqueue(RemoteCalls, call);
        } else {
            log::warn!(
                "dispatch: unhandled function call '{}' {:?} (network link disabled)",
                call.name,
                call.args
            );
        }
        Ok(())
    }

    fn show_listening_state(&mut self, state: ListeningState) {
        let (red, green, blue) = listening_colour(state, self.led_intensity);
        self.board.rgb_led(red, green, blue);
    }

    /// Buzzer and LED off.
    fn shutdown(&mut self) {
        self.board.buzzer_off();
        self.board.rgb_led(0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::LoggingBus;
    use serde_json::json;

    fn router(forward_remote: bool) -> (Arc<Broker>, ActuatorRouter<LoggingBus>) {
        let broker = Arc::new(Broker::new());
        let board = ArmBoard::new(LoggingBus::new(1, 0x15));
        (
            Arc::clone(&broker),
            ActuatorRouter::new(broker, board, forward_remote, 60),
        )
    }

    #[test]
    fn beep_runs_locally() {
        let (broker, mut router) = router(true);
        router
            .execute(FunctionCall::new("beep").with_arg("seconds", json!(2)))
            .unwrap();
        assert_eq!(router.board.bus().writes(), 1);
        assert_eq!(broker.size(RemoteCalls), 0);
    }

    #[test]
    fn malformed_beep_is_an_error() {
        let (_, mut router) = router(false);
        assert!(router.execute(FunctionCall::new("beep")).is_err());
        assert!(router
            .execute(FunctionCall::new("beep").with_arg("seconds", json!(-1.0)))
            .is_err());
        assert_eq!(router.board.bus().writes(), 0);
    }

    #[test]
    fn other_calls_are_forwarded_when_linked() {
        let (broker, mut router) = router(true);
        let call = FunctionCall::new("move_arm").with_arg("x_axis", json!(0.5));
        router.execute(call.clone()).unwrap();
        assert_eq!(broker.dequeue(RemoteCalls), Some(call));
    }

    #[test]
    fn other_calls_are_dropped_without_link() {
        let (broker, mut router) = router(false);
        router.execute(FunctionCall::new("next_mode")).unwrap();
        assert_eq!(broker.size(RemoteCalls), 0);
        assert_eq!(router.board.bus().writes(), 0);
    }

    #[test]
    fn colours() {
        assert_eq!(listening_colour(ListeningState::Idle, 60), (60, 0, 0));
        assert_eq!(listening_colour(ListeningState::Recording, 60), (0, 60, 0));
        assert_eq!(listening_colour(ListeningState::Trailing, 60), (60, 60, 0));
    }

    #[test]
    fn shutdown_silences_buzzer_and_led() {
        let (_, mut router) = router(false);
        router
            .execute(FunctionCall::new("beep").with_arg("seconds", json!(5)))
            .unwrap();
        router.shutdown();
        assert_eq!(router.board.bus().writes(), 3);
    }

    #[test]
    fn listening_state_drives_the_led() {
        let (_, mut router) = router(false);
        router.show_listening_state(ListeningState::Recording);
        assert_eq!(router.board.bus().writes(), 1);
    }
}
