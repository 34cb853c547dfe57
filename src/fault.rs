//! Link health for the CardKB poller.
//!
//! Transport errors never stop the poller: the tick is skipped and the next
//! one tries again. This module only records what happened so a monitor
//! (console, status LED) can tell a flaky bus from a missing device.
//!
//! All state is atomic so the monitor can read it from another task while
//! the poller is running.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::transport::TransportError;

/// Last transport fault seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkFault {
    /// No fault recorded.
    None = 0,
    /// Bus transaction error.
    Bus = 1,
    /// Device did not answer.
    NoDevice = 2,
}

impl LinkFault {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkFault::Bus,
            2 => LinkFault::NoDevice,
            _ => LinkFault::None,
        }
    }
}

impl From<TransportError> for LinkFault {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Bus => LinkFault::Bus,
            TransportError::NoDevice => LinkFault::NoDevice,
        }
    }
}

/// Thread-safe link health counters.
///
/// # Usage
///
/// ```ignore
/// static HEALTH: LinkHealth = LinkHealth::new();
///
/// // In the poller:
/// match transport.read_status() {
///     Ok(raw) => { HEALTH.record_success(); /* translate */ }
///     Err(e) => { HEALTH.record_failure(e); /* skip tick */ }
/// }
///
/// // In a monitor task:
/// if HEALTH.is_failing() {
///     status_led_blink();
/// }
/// ```
pub struct LinkHealth {
    /// True while the most recent read failed.
    failing: AtomicBool,

    /// Last fault code.
    last_fault: AtomicU8,

    /// Failed reads in the current streak.
    consecutive: AtomicU32,

    /// Failed reads since boot (never cleared).
    total_failures: AtomicU32,

    /// Nonzero codes with no keymap entry since boot.
    unrecognized: AtomicU32,

    /// Most recent unrecognized code.
    last_unrecognized: AtomicU8,
}

impl LinkHealth {
    /// Healthy link, all counters zero.
    pub const fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            last_fault: AtomicU8::new(0),
            consecutive: AtomicU32::new(0),
            total_failures: AtomicU32::new(0),
            unrecognized: AtomicU32::new(0),
            last_unrecognized: AtomicU8::new(0),
        }
    }

    /// Record a failed read.
    ///
    /// Returns `true` if this failure starts a new streak.
    #[inline]
    pub fn record_failure(&self, err: TransportError) -> bool {
        self.last_fault.store(LinkFault::from(err) as u8, Ordering::Release);
        self.consecutive.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        !self.failing.swap(true, Ordering::AcqRel)
    }

    /// Record a successful read.
    ///
    /// Returns the length of the failure streak that just ended, if any.
    #[inline]
    pub fn record_success(&self) -> Option<u32> {
        if self.failing.swap(false, Ordering::AcqRel) {
            Some(self.consecutive.swap(0, Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Record a nonzero code with no keymap entry.
    #[inline]
    pub fn record_unrecognized(&self, raw: u8) {
        self.last_unrecognized.store(raw, Ordering::Relaxed);
        self.unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    /// True while reads are failing.
    #[inline]
    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Acquire)
    }

    /// Last fault (only meaningful after at least one failure).
    #[inline]
    pub fn last_fault(&self) -> LinkFault {
        LinkFault::from_u8(self.last_fault.load(Ordering::Acquire))
    }

    /// Failures in the current streak.
    #[inline]
    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the current link state.
    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            failing: self.is_failing(),
            last_fault: self.last_fault(),
            consecutive: self.consecutive(),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            last_unrecognized: self.last_unrecognized.load(Ordering::Relaxed),
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Link health of the default poller.
pub static LINK_HEALTH: LinkHealth = LinkHealth::new();

/// Snapshot of link health at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub failing: bool,
    pub last_fault: LinkFault,
    pub consecutive: u32,
    pub total_failures: u32,
    pub unrecognized: u32,
    pub last_unrecognized: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_streak() {
        let health = LinkHealth::new();
        assert!(!health.is_failing());
        assert_eq!(health.last_fault(), LinkFault::None);

        assert!(health.record_failure(TransportError::Bus));
        assert!(!health.record_failure(TransportError::NoDevice));

        assert!(health.is_failing());
        assert_eq!(health.last_fault(), LinkFault::NoDevice);
        assert_eq!(health.consecutive(), 2);

        assert_eq!(health.record_success(), Some(2));
        assert!(!health.is_failing());
        assert_eq!(health.consecutive(), 0);
        assert_eq!(health.record_success(), None);
    }

    #[test]
    fn test_totals_survive_recovery() {
        let health = LinkHealth::new();

        health.record_failure(TransportError::Bus);
        health.record_success();
        health.record_failure(TransportError::Bus);
        health.record_unrecognized(0xA8);

        let snap = health.snapshot();
        assert_eq!(snap.total_failures, 2);
        assert_eq!(snap.consecutive, 1);
        assert_eq!(snap.unrecognized, 1);
        assert_eq!(snap.last_unrecognized, 0xA8);
    }
}
