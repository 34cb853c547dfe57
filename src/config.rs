//! Module: config
//!
//! Purpose: Driver configuration for the CardKB poller.
//!
//! Architecture:
//! - Plain `Copy` struct, set once at startup and handed to the poller.
//! - Defaults match the CardKB hardware: I2C address 0x5F, status byte at
//!   register 0x5F, 20 ms poll period.
//!
//! Safety: Safe. No unsafe blocks.

/// Default CardKB I2C address.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x5F;

/// Register holding the current key code.
pub const DEFAULT_STATUS_REGISTER: u8 = 0x5F;

/// Default poll period in milliseconds.
pub const DEFAULT_POLL_PERIOD_MS: u32 = 20;

/// Shortest accepted poll period.
pub const MIN_POLL_PERIOD_MS: u32 = 1;

/// Name reported to the input backend.
pub const DEVICE_NAME: &str = "CardKB I2C Keyboard";

/// Bus the device is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusType {
    I2c,
}

impl BusType {
    pub fn as_str(self) -> &'static str {
        match self {
            BusType::I2c => "i2c",
        }
    }
}

/// CardKB driver configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// 7-bit I2C device address.
    pub i2c_address: u8,

    /// Register read on every tick.
    pub status_register: u8,

    /// Poll period in milliseconds (>= [`MIN_POLL_PERIOD_MS`]).
    pub poll_period_ms: u32,

    /// Device name for registration and logs.
    pub device_name: &'static str,

    /// Bus type for registration.
    pub bus: BusType,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            i2c_address: DEFAULT_I2C_ADDRESS,
            status_register: DEFAULT_STATUS_REGISTER,
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            device_name: DEVICE_NAME,
            bus: BusType::I2c,
        }
    }
}

impl DriverConfig {
    /// Default config with a different poll period.
    pub fn with_period_ms(period_ms: u32) -> Self {
        Self {
            poll_period_ms: period_ms.max(MIN_POLL_PERIOD_MS),
            ..Default::default()
        }
    }

    /// Same config at another I2C address.
    pub fn with_address(self, i2c_address: u8) -> Self {
        Self { i2c_address, ..self }
    }

    /// Effective poll period, never zero.
    #[inline]
    pub fn period_ms(&self) -> u32 {
        self.poll_period_ms.max(MIN_POLL_PERIOD_MS)
    }
}
