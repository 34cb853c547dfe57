//! Module: poller
//!
//! Purpose: Fixed-period poll loop: read one status byte, translate, deliver.
//!
//! Architecture:
//! - [`Poller`] owns the translator (and so the held state), the transport
//!   and the sink. Nothing else touches them while it runs.
//! - [`PollControl`] is the shared cancel handle. The loop must win a
//!   `begin_tick` before each tick and always calls `end_tick` after it, so
//!   at most one tick is ever in flight.
//! - [`PollControl::cancel`] is idempotent and returns only once no tick is
//!   running and none can start.
//!
//! ```text
//!   ┌──────── delay(period) ◀────────┐
//!   ▼                                │
//! begin_tick ──▶ read ──▶ step ──▶ dispatch ──▶ end_tick
//!   │ (cancelled)
//!   ▼
//!  exit
//! ```
//!
//! Safety: Safe. Atomics only, no unsafe blocks.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embedded_hal::delay::DelayNs;

use crate::config::DriverConfig;
use crate::fault::{LinkHealth, LINK_HEALTH};
use crate::keymap::Keymap;
use crate::logging::{LogStream, LOG_STREAM};
use crate::sink::{dispatch, EventSink};
use crate::translator::{EventBatch, HeldState, StepKind, Translator};
use crate::transport::{Transport, TransportError};
use crate::{kb_debug, kb_info, kb_trace, kb_warn};

const ARMED: u8 = 0;
const TICKING: u8 = 1;
const CANCELLED: u8 = 2;

/// Wait between `cancel_with` attempts (µs).
const CANCEL_RETRY_US: u32 = 500;

/// Shared cancel handle for one poll loop.
///
/// # Usage
///
/// ```ignore
/// static CONTROL: PollControl = PollControl::new();
///
/// // Poll task:
/// poller.run(&CONTROL, &mut delay);
///
/// // Shutdown path:
/// CONTROL.cancel(); // returns once no tick is in flight
/// poll_task.join();
/// ```
pub struct PollControl {
    state: AtomicU8,
    cancel_requested: AtomicBool,
    completed: AtomicU32,
}

impl PollControl {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ARMED),
            cancel_requested: AtomicBool::new(false),
            completed: AtomicU32::new(0),
        }
    }

    /// Claim the next tick.
    ///
    /// Returns `false` once cancellation was requested; the loop must exit.
    #[inline]
    pub fn begin_tick(&self) -> bool {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.state
            .compare_exchange(ARMED, TICKING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the tick claimed by `begin_tick`.
    #[inline]
    pub fn end_tick(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.state.store(ARMED, Ordering::Release);
    }

    /// Stop the loop.
    ///
    /// Blocks until any in-flight tick has finished. After return no further
    /// tick will start. Calling it again is a no-op.
    ///
    /// Busy-waits: the caller must not outrank the poll task on the same
    /// core. Use [`PollControl::cancel_with`] from a higher-priority task.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        while !self.try_seal() {
            core::hint::spin_loop();
        }
    }

    /// Same as [`PollControl::cancel`], but sleeps on `delay` between
    /// attempts so the poll task can finish its tick.
    ///
    /// Returns the number of waits it took.
    pub fn cancel_with<D: DelayNs>(&self, delay: &mut D) -> u32 {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let mut waits = 0u32;
        while !self.try_seal() {
            delay.delay_us(CANCEL_RETRY_US);
            waits = waits.wrapping_add(1);
        }
        waits
    }

    /// Move ARMED to CANCELLED. True once the loop is sealed.
    #[inline]
    fn try_seal(&self) -> bool {
        matches!(
            self.state
                .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire),
            Ok(_) | Err(CANCELLED)
        )
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// True while a tick is executing.
    #[inline]
    pub fn is_ticking(&self) -> bool {
        self.state.load(Ordering::Acquire) == TICKING
    }

    /// Ticks completed under this handle.
    #[inline]
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl Default for PollControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Events were delivered to the sink, followed by one `sync()`.
    Delivered(EventBatch),
    /// Read succeeded, nothing changed.
    Steady,
    /// Nonzero code with no keymap entry; held state kept.
    Unrecognized(u8),
    /// Read failed; tick skipped, state untouched.
    Skipped(TransportError),
}

/// Poll loop for one device.
///
/// # Example
///
/// ```
/// use rust_cardkb::config::DriverConfig;
/// use rust_cardkb::keymap::CARDKB_KEYMAP;
/// use rust_cardkb::poller::{Poller, TickOutcome};
/// use rust_cardkb::sink::TextSink;
/// use rust_cardkb::transport::{Transport, TransportError};
///
/// struct Fixed(u8);
/// impl Transport for Fixed {
///     fn read_status(&mut self) -> Result<u8, TransportError> {
///         Ok(self.0)
///     }
/// }
///
/// let mut poller = Poller::new(&CARDKB_KEYMAP, Fixed(b'k'), TextSink::new(String::new()), DriverConfig::default());
/// assert!(matches!(poller.tick(), TickOutcome::Delivered(_)));
/// assert_eq!(poller.tick(), TickOutcome::Steady);
/// assert_eq!(poller.sink().writer().as_str(), "k");
/// ```
pub struct Poller<'a, T, S> {
    translator: Translator<'a>,
    transport: T,
    sink: S,
    config: DriverConfig,
    health: &'a LinkHealth,
    log: &'a LogStream,
    ticks: u32,
}

impl<'a, T: Transport, S: EventSink> Poller<'a, T, S> {
    /// Create a poller and declare the keymap's capabilities to `sink`.
    pub fn new(keymap: &'a Keymap, transport: T, mut sink: S, config: DriverConfig) -> Self {
        sink.register(&keymap.capabilities());
        Self {
            translator: Translator::new(keymap),
            transport,
            sink,
            config,
            health: &LINK_HEALTH,
            log: &LOG_STREAM,
            ticks: 0,
        }
    }

    /// Record link health into `health` instead of the global one.
    pub fn with_health(mut self, health: &'a LinkHealth) -> Self {
        self.health = health;
        self
    }

    /// Log into `log` instead of the global stream.
    pub fn with_log(mut self, log: &'a LogStream) -> Self {
        self.log = log;
        self
    }

    /// Milliseconds of polling so far (ticks × period).
    #[inline]
    pub fn elapsed_ms(&self) -> u32 {
        self.ticks.wrapping_mul(self.config.period_ms())
    }

    /// Run one poll cycle.
    pub fn tick(&mut self) -> TickOutcome {
        self.ticks = self.ticks.wrapping_add(1);
        let now = self.elapsed_ms();

        let raw = match self.transport.read_status() {
            Ok(raw) => raw,
            Err(err) => {
                if self.health.record_failure(err) {
                    kb_warn!(self.log, now, "status read failed: {}", err);
                }
                return TickOutcome::Skipped(err);
            }
        };

        if let Some(streak) = self.health.record_success() {
            kb_info!(self.log, now, "link recovered after {} failed reads", streak);
        }

        let batch = self.translator.step(raw);
        match self.translator.last_kind() {
            StepKind::Changed => {
                kb_trace!(self.log, now, "0x{:02X} -> {:?}", raw, batch.as_slice());
                dispatch(&batch, &mut self.sink);
                TickOutcome::Delivered(batch)
            }
            StepKind::Unrecognized => {
                self.health.record_unrecognized(raw);
                kb_debug!(self.log, now, "unrecognized code 0x{:02X}", raw);
                TickOutcome::Unrecognized(raw)
            }
            StepKind::Steady => TickOutcome::Steady,
        }
    }

    /// Poll every `config.period_ms()` until `control` is cancelled.
    ///
    /// The first tick runs one period after the call. Returns the number of
    /// ticks executed by this call.
    pub fn run<D: DelayNs>(&mut self, control: &PollControl, delay: &mut D) -> u32 {
        let period = self.config.period_ms();
        kb_info!(
            self.log,
            self.elapsed_ms(),
            "{} on {} 0x{:02X}: polling every {} ms",
            self.config.device_name,
            self.config.bus.as_str(),
            self.config.i2c_address,
            period
        );

        let mut executed = 0u32;
        loop {
            delay.delay_ms(period);
            if !control.begin_tick() {
                break;
            }
            self.tick();
            control.end_tick();
            executed = executed.wrapping_add(1);
        }

        kb_info!(self.log, self.elapsed_ms(), "poller stopped after {} ticks", executed);
        executed
    }

    /// Current held state.
    #[inline]
    pub fn held(&self) -> HeldState {
        self.translator.state()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Tear down, returning the transport, the sink and the last held state.
    pub fn into_parts(self) -> (T, S, HeldState) {
        (self.transport, self.sink, self.translator.state())
    }
}
