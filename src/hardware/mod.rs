//! Actuator board: RGB LED, buzzer and PWM servos behind a register bus.
//!
//! [`ArmCommand`] is the typed vocabulary, [`ArmCommand::encode`] maps each
//! command onto the board's register protocol, and [`ArmBoard`] sends the
//! writes over any [`RegisterBus`].
//!
//! | Command      | Register         | Payload                          |
//! |--------------|------------------|----------------------------------|
//! | RGB          | `0x02` (block)   | `[r, g, b]`                      |
//! | Reset        | `0x05`           | `0x01`                           |
//! | Servo 1–6    | `0x50 + id`      | angle `0–180`                    |
//! | All servos   | `0x57`           | angle `0–180`                    |
//! | Buzzer on    | `0x06`           | `1–50` (× 100 ms), `0xff` = hold |
//! | Buzzer off   | `0x06`           | `0x00`                           |

pub mod board;
pub mod bus;

use std::time::Duration;

use thiserror::Error;

pub use board::ArmBoard;
pub use bus::LoggingBus;

pub const REG_RGB: u8 = 0x02;
pub const REG_RESET: u8 = 0x05;
pub const REG_BUZZER: u8 = 0x06;
pub const REG_SERVO_BASE: u8 = 0x50;
pub const REG_ALL_SERVOS: u8 = 0x57;

const MAX_SERVO_ID: u8 = 6;
const MAX_ANGLE: u8 = 180;
const MAX_BUZZER_TICKS: u8 = 50;

// ---------------------------------------------------------------------------
// Errors / bus trait
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("bus write to register {register:#04x} failed: {reason}")]
    Bus { register: u8, reason: String },

    #[error("servo id {0} out of range (0 = all, 1–6)")]
    ServoId(u8),
}

/// Byte-register interface of the board's bus.
pub trait RegisterBus: Send {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), HardwareError>;

    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), HardwareError>;
}

// ---------------------------------------------------------------------------
// ArmCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmCommand {
    Rgb { red: u8, green: u8, blue: u8 },
    Reset,
    /// `id` 0 moves every servo.
    Servo { id: u8, angle: u8 },
    /// Auto-off after `duration`, rounded to 100 ms ticks and capped at 5 s.
    /// Anything under 50 ms rounds to zero ticks and writes nothing.
    Buzzer { duration: Duration },
    BuzzerOff,
}

/// One bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterWrite {
    Byte { register: u8, value: u8 },
    Block { register: u8, data: Vec<u8> },
}

impl ArmCommand {
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        ArmCommand::Rgb { red, green, blue }
    }

    /// Translate to register writes.  A buzzer duration that rounds to zero
    /// ticks produces no write.
    pub fn encode(&self) -> Result<Vec<RegisterWrite>, HardwareError> {
        let byte = |register, value| RegisterWrite::Byte { register, value };
        let writes = match *self {
            ArmCommand::Rgb { red, green, blue } => vec![RegisterWrite::Block {
                register: REG_RGB,
                data: vec![red, green, blue],
            }],
            ArmCommand::Reset => vec![byte(REG_RESET, 0x01)],
            ArmCommand::Servo { id, angle } => {
                let register = match id {
                    0 => REG_ALL_SERVOS,
                    1..=MAX_SERVO_ID => REG_SERVO_BASE + id,
                    _ => return Err(HardwareError::ServoId(id)),
                };
                vec![byte(register, angle.min(MAX_ANGLE))]
            }
            ArmCommand::Buzzer { duration } => match buzzer_ticks(duration) {
                0 => Vec::new(),
                ticks => vec![byte(REG_BUZZER, ticks)],
            },
            ArmCommand::BuzzerOff => vec![byte(REG_BUZZER, 0x00)],
        };
        Ok(writes)
    }
}

/// 100 ms ticks, rounded, capped at 5 s.
fn buzzer_ticks(duration: Duration) -> u8 {
    let ticks = (duration.as_millis() + 50) / 100;
    ticks.min(u128::from(MAX_BUZZER_TICKS)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(command: ArmCommand) -> RegisterWrite {
        let mut writes = command.encode().unwrap();
        assert_eq!(writes.len(), 1, "{command:?}");
        writes.remove(0)
    }

    #[test]
    fn rgb_is_a_block_write() {
        assert_eq!(
            single(ArmCommand::rgb(10, 20, 30)),
            RegisterWrite::Block {
                register: 0x02,
                data: vec![10, 20, 30]
            }
        );
    }

    #[test]
    fn reset_register() {
        assert_eq!(
            single(ArmCommand::Reset),
            RegisterWrite::Byte {
                register: 0x05,
                value: 0x01
            }
        );
    }

    #[test]
    fn servo_registers_and_angle_clamp() {
        assert_eq!(
            single(ArmCommand::Servo { id: 0, angle: 90 }),
            RegisterWrite::Byte {
                register: 0x57,
                value: 90
            }
        );
        assert_eq!(
            single(ArmCommand::Servo { id: 3, angle: 250 }),
            RegisterWrite::Byte {
                register: 0x53,
                value: 180
            }
        );
        assert!(matches!(
            ArmCommand::Servo { id: 7, angle: 0 }.encode(),
            Err(HardwareError::ServoId(7))
        ));
    }

    #[test]
    fn buzzer_ticks_are_clamped() {
        let buzz = |ms| ArmCommand::Buzzer {
            duration: Duration::from_millis(ms),
        };
        assert_eq!(
            single(buzz(1_500)),
            RegisterWrite::Byte {
                register: 0x06,
                value: 15
            }
        );
        assert_eq!(
            single(buzz(60_000)),
            RegisterWrite::Byte {
                register: 0x06,
                value: 50
            }
        );
        assert_eq!(
            single(buzz(100)),
            RegisterWrite::Byte {
                register: 0x06,
                value: 1
            }
        );
        assert_eq!(
            single(buzz(50)),
            RegisterWrite::Byte {
                register: 0x06,
                value: 1
            }
        );
        assert!(buzz(49).encode().unwrap().is_empty());
        assert!(buzz(20).encode().unwrap().is_empty());
    }

    #[test]
    fn buzzer_off() {
        assert_eq!(
            single(ArmCommand::BuzzerOff),
            RegisterWrite::Byte {
                register: 0x06,
                value: 0x00
            }
        );
    }
}
