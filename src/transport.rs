//! Status byte transport.
//!
//! The poller only needs "give me the current status byte". How the byte
//! travels (I2C register read, test script, simulator) is behind [`Transport`].

/// Transport failure. Carries no recovery data: the tick is simply skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Bus transaction failed (NACK, arbitration loss, timeout).
    Bus,
    /// Device did not acknowledge its address.
    NoDevice,
}

impl TransportError {
    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Bus => "bus transaction failed",
            Self::NoDevice => "device not responding",
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

/// Source of raw status bytes.
pub trait Transport {
    /// Read the controller status byte once.
    ///
    /// `0x00` means no key is pressed.
    fn read_status(&mut self) -> Result<u8, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    #[inline]
    fn read_status(&mut self) -> Result<u8, TransportError> {
        (**self).read_status()
    }
}
