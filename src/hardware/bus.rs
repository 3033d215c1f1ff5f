use super::{HardwareError, RegisterBus};

/// Dry-run bus: logs every transaction at debug level instead of touching
/// the device.  Used when no I²C adapter is available.
#[derive(Debug)]
pub struct LoggingBus {
    bus_number: u8,
    address: u8,
    writes: u64,
}

impl LoggingBus {
    pub fn new(bus_number: u8, address: u8) -> Self {
        log::info!("hardware: dry-run bus i2c-{bus_number} @ {address:#04x}");
        Self {
            bus_number,
            address,
            writes: 0,
        }
    }

    /// Transactions issued so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl RegisterBus for LoggingBus {
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), HardwareError> {
        self.writes += 1;
        log::debug!(
            "hardware: i2c-{}@{:#04x} reg {register:#04x} <- {value:#04x}",
            self.bus_number,
            self.address
        );
        Ok(())
    }

    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), HardwareError> {
        self.writes += 1;
        log::debug!(
            "hardware: i2c-{}@{:#04x} reg {register:#04x} <- {data:02x?}",
            self.bus_number,
            self.address
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ArmBoard;

    #[test]
    fn counts_transactions() {
        let mut board = ArmBoard::new(LoggingBus::new(1, 0x15));
        board.rgb_led(0, 60, 0);
        board.buzzer_off();
        assert_eq!(board.bus().writes(), 2);
    }
}
