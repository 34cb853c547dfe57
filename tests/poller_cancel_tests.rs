//! Poller lifecycle tests
//!
//! Runs the poll loop on a real thread and checks the cancel contract:
//! cancel waits for the in-flight tick, no tick starts afterwards, and
//! repeated or concurrent cancels are harmless.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use rust_cardkb::keymap::{LogicalKey, CARDKB_KEYMAP};
use rust_cardkb::logging::LogStream;
use rust_cardkb::{DriverConfig, EventSink, HeldState, LinkHealth, PollControl, Poller, Transport, TransportError};

struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Transport reporting a fixed code, with an optionally slow read.
struct Probe {
    raw: u8,
    read_time: Duration,
    reads: Arc<AtomicU32>,
    in_read: Arc<AtomicBool>,
}

impl Transport for Probe {
    fn read_status(&mut self) -> Result<u8, TransportError> {
        self.in_read.store(true, Ordering::SeqCst);
        thread::sleep(self.read_time);
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.in_read.store(false, Ordering::SeqCst);
        Ok(self.raw)
    }
}

#[derive(Default)]
struct Counting {
    presses: u32,
    syncs: u32,
}

impl EventSink for Counting {
    fn press(&mut self, _key: LogicalKey) {
        self.presses += 1;
    }
    fn release(&mut self, _key: LogicalKey) {}
    fn press_shift(&mut self) {}
    fn release_shift(&mut self) {}
    fn sync(&mut self) {
        self.syncs += 1;
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

struct Harness {
    control: &'static PollControl,
    reads: Arc<AtomicU32>,
    in_read: Arc<AtomicBool>,
    task: thread::JoinHandle<(u32, Counting, HeldState)>,
}

fn start(raw: u8, read_time: Duration) -> Harness {
    let control = leak(PollControl::new());
    let health = leak(LinkHealth::new());
    let log = leak(LogStream::new());
    let reads = Arc::new(AtomicU32::new(0));
    let in_read = Arc::new(AtomicBool::new(false));

    let probe = Probe {
        raw,
        read_time,
        reads: Arc::clone(&reads),
        in_read: Arc::clone(&in_read),
    };

    let task = thread::spawn(move || {
        let mut poller = Poller::new(&CARDKB_KEYMAP, probe, Counting::default(), DriverConfig::with_period_ms(1))
            .with_health(health)
            .with_log(log);
        let ticks = poller.run(control, &mut SleepDelay);
        let (_, sink, held) = poller.into_parts();
        (ticks, sink, held)
    });

    Harness { control, reads, in_read, task }
}

fn wait_for_reads(reads: &AtomicU32, n: u32) {
    while reads.load(Ordering::SeqCst) < n {
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_cancel_stops_reads() {
    let harness = start(b'w', Duration::ZERO);
    wait_for_reads(&harness.reads, 5);

    harness.control.cancel();
    let at_cancel = harness.reads.load(Ordering::SeqCst);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(harness.reads.load(Ordering::SeqCst), at_cancel);

    let (ticks, sink, held) = harness.task.join().unwrap();
    assert_eq!(ticks, at_cancel);
    assert_eq!(sink.presses, 1);
    assert_eq!(sink.syncs, 1);
    assert_eq!(held, HeldState::Held { key: LogicalKey::W, shift: false });
}

#[test]
fn test_cancel_waits_for_in_flight_tick() {
    let harness = start(b'q', Duration::from_millis(30));

    while !harness.in_read.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    harness.control.cancel();
    // The read that was running when cancel was called has completed
    assert!(!harness.in_read.load(Ordering::SeqCst));
    assert!(!harness.control.is_ticking());
    assert!(harness.reads.load(Ordering::SeqCst) >= 1);

    let (ticks, _, _) = harness.task.join().unwrap();
    assert_eq!(ticks, harness.reads.load(Ordering::SeqCst));
}

#[test]
fn test_concurrent_cancel_is_idempotent() {
    let harness = start(0x00, Duration::ZERO);
    wait_for_reads(&harness.reads, 3);

    let control = harness.control;
    let cancellers: Vec<_> = (0..4).map(|_| thread::spawn(move || control.cancel())).collect();
    for c in cancellers {
        c.join().unwrap();
    }
    control.cancel();

    assert!(control.is_cancelled());
    let (ticks, sink, held) = harness.task.join().unwrap();
    assert_eq!(ticks, control.completed());
    assert_eq!(sink.syncs, 0);
    assert_eq!(held, HeldState::Idle);
}

#[test]
fn test_yielding_cancel_waits_for_in_flight_tick() {
    let harness = start(b'e', Duration::from_millis(20));

    while !harness.in_read.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    let waits = harness.control.cancel_with(&mut SleepDelay);
    assert!(waits >= 1, "cancel returned while the read was running");
    assert!(!harness.in_read.load(Ordering::SeqCst));
    assert!(harness.control.is_cancelled());

    let (ticks, sink, _) = harness.task.join().unwrap();
    assert_eq!(ticks, harness.reads.load(Ordering::SeqCst));
    assert_eq!(sink.presses, 1);
}
