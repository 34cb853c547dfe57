//! CardKB I2C status reader
//!
//! The controller exposes the code of the key currently pressed as a single
//! register: write the register address, read one byte back.
//! Reference: M5Stack CardKB firmware (0x00 = no key)

use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};

use crate::config::DriverConfig;
use crate::transport::{Transport, TransportError};

/// CardKB on an I2C bus.
///
/// Works with any `embedded_hal::i2c::I2c` implementation: the ESP-IDF
/// driver on target, a mock on host.
pub struct CardKb<I> {
    i2c: I,
    address: u8,
    register: u8,
}

impl<I: I2c> CardKb<I> {
    /// Wrap a bus using the address and register from `config`.
    pub fn new(i2c: I, config: &DriverConfig) -> Self {
        Self {
            i2c,
            address: config.i2c_address,
            register: config.status_register,
        }
    }

    /// Check that the device answers.
    ///
    /// Any key code (including 0x00) counts as present.
    pub fn probe(&mut self) -> Result<(), TransportError> {
        self.read_status().map(|_| ())
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Transport for CardKb<I> {
    fn read_status(&mut self) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[self.register], &mut buf)
            .map_err(|e| classify(e.kind()))?;
        Ok(buf[0])
    }
}

fn classify(kind: ErrorKind) -> TransportError {
    match kind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => TransportError::NoDevice,
        _ => TransportError::Bus,
    }
}
