use std::time::Duration;

use super::{ArmCommand, HardwareError, RegisterBus, RegisterWrite};

/// High-level actuator API.  Bus failures are logged and swallowed: a
/// missed LED update or beep must never take down the caller.
pub struct ArmBoard<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> ArmBoard<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn rgb_led(&mut self, red: u8, green: u8, blue: u8) -> bool {
        self.execute(ArmCommand::rgb(red, green, blue))
    }

    /// Return every actuator to its power-on state.
    pub fn reset(&mut self) -> bool {
        self.execute(ArmCommand::Reset)
    }

    pub fn buzzer_on(&mut self, duration: Duration) -> bool {
        self.execute(ArmCommand::Buzzer { duration })
    }

    pub fn buzzer_off(&mut self) -> bool {
        self.execute(ArmCommand::BuzzerOff)
    }

    /// Send one command.  Returns `false` (after logging) on failure.
    pub fn execute(&mut self, command: ArmCommand) -> bool {
        match self.try_execute(command) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("hardware: {command:?} failed: {e}");
                false
            }
        }
    }

    fn try_execute(&mut self, command: ArmCommand) -> Result<(), HardwareError> {
        for write in command.encode()? {
            match write {
                RegisterWrite::Byte { register, value } => self.bus.write_byte(register, value)?,
                RegisterWrite::Block { register, data } => {
                    self.bus.write_block(register, &data)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<RegisterWrite>,
        fail: bool,
    }

    impl RegisterBus for RecordingBus {
        fn write_byte(&mut self, register: u8, value: u8) -> Result<(), HardwareError> {
            if self.fail {
                return Err(HardwareError::Bus {
                    register,
                    reason: "nack".into(),
                });
            }
            self.writes.push(RegisterWrite::Byte { register, value });
            Ok(())
        }

        fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), HardwareError> {
            if self.fail {
                return Err(HardwareError::Bus {
                    register,
                    reason: "nack".into(),
                });
            }
            self.writes.push(RegisterWrite::Block {
                register,
                data: data.to_vec(),
            });
            Ok(())
        }
    }

    #[test]
    fn commands_reach_the_bus_in_order() {
        let mut board = ArmBoard::new(RecordingBus::default());
        assert!(board.rgb_led(255, 0, 0));
        assert!(board.execute(ArmCommand::Servo { id: 2, angle: 45 }));
        assert!(board.buzzer_on(Duration::from_secs(2)));
        assert!(board.buzzer_off());
        assert!(board.reset());

        assert_eq!(
            board.bus().writes,
            vec![
                RegisterWrite::Block {
                    register: 0x02,
                    data: vec![255, 0, 0]
                },
                RegisterWrite::Byte {
                    register: 0x52,
                    value: 45
                },
                RegisterWrite::Byte {
                    register: 0x06,
                    value: 20
                },
                RegisterWrite::Byte {
                    register: 0x06,
                    value: 0
                },
                RegisterWrite::Byte {
                    register: 0x05,
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn bus_failure_is_swallowed() {
        let mut board = ArmBoard::new(RecordingBus {
            fail: true,
            ..Default::default()
        });
        assert!(!board.rgb_led(1, 2, 3));
        assert!(!board.buzzer_on(Duration::from_secs(1)));
        assert!(board.bus().writes.is_empty());
    }

    #[test]
    fn invalid_servo_is_rejected_without_writing() {
        let mut board = ArmBoard::new(RecordingBus::default());
        assert!(!board.execute(ArmCommand::Servo { id: 9, angle: 90 }));
        assert!(board.bus().writes.is_empty());
    }

    #[test]
    fn zero_length_beep_is_a_no_op() {
        let mut board = ArmBoard::new(RecordingBus::default());
        assert!(board.buzzer_on(Duration::ZERO));
        assert!(board.bus().writes.is_empty());
    }
}
