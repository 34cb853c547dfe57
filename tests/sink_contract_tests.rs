//! Event sink contract tests
//!
//! Drives the poller end to end and checks what the sink observes:
//! capabilities first, no double press/release, one sync per changed tick.

use rust_cardkb::keymap::{Capabilities, LogicalKey, CARDKB_KEYMAP};
use rust_cardkb::logging::LogStream;
use rust_cardkb::poller::TickOutcome;
use rust_cardkb::{DriverConfig, EventSink, LinkHealth, Poller, TextSink, Transport, TransportError};

/// Sink that panics on any contract violation.
#[derive(Default)]
struct StrictSink {
    registered: bool,
    down: Option<LogicalKey>,
    shift: bool,
    pending: u32,
    syncs: u32,
}

impl StrictSink {
    fn changed(&mut self) {
        assert!(self.registered, "event before capability registration");
        self.pending += 1;
    }
}

impl EventSink for StrictSink {
    fn register(&mut self, caps: &Capabilities) {
        assert!(!self.registered, "registered twice");
        assert!(caps.shift);
        self.registered = true;
    }

    fn press(&mut self, key: LogicalKey) {
        self.changed();
        assert_eq!(self.down, None, "double press");
        self.down = Some(key);
    }

    fn release(&mut self, key: LogicalKey) {
        self.changed();
        assert_eq!(self.down, Some(key), "release without press");
        self.down = None;
    }

    fn press_shift(&mut self) {
        self.changed();
        assert!(!self.shift, "double shift press");
        self.shift = true;
    }

    fn release_shift(&mut self) {
        self.changed();
        assert!(self.shift, "shift release without press");
        self.shift = false;
    }

    fn sync(&mut self) {
        assert!(self.pending > 0, "sync with no pending changes");
        self.pending = 0;
        self.syncs += 1;
    }
}

struct Script(std::vec::IntoIter<Result<u8, TransportError>>);

impl Script {
    fn new(items: Vec<Result<u8, TransportError>>) -> Self {
        Self(items.into_iter())
    }
}

impl Transport for Script {
    fn read_status(&mut self) -> Result<u8, TransportError> {
        self.0.next().unwrap_or(Ok(0x00))
    }
}

#[test]
fn test_strict_sink_over_mixed_input() {
    let health = LinkHealth::new();
    let log = LogStream::new();
    let script = vec![
        Ok(b'a'),
        Ok(b'a'),
        Err(TransportError::Bus),
        Ok(b'A'),
        Ok(0xA8),
        Ok(b'!'),
        Ok(b'1'),
        Err(TransportError::NoDevice),
        Ok(0x00),
        Ok(0x00),
        Ok(b'~'),
        Ok(b'`'),
        Ok(0x00),
    ];
    let ticks = script.len();
    let mut poller = Poller::new(&CARDKB_KEYMAP, Script::new(script), StrictSink::default(), DriverConfig::default())
        .with_health(&health)
        .with_log(&log);

    let mut delivered = 0;
    for _ in 0..ticks {
        if let TickOutcome::Delivered(_) = poller.tick() {
            delivered += 1;
        }
    }

    let (_, sink, held) = poller.into_parts();
    assert_eq!(sink.syncs, delivered);
    assert_eq!(sink.down, None);
    assert!(!sink.shift);
    assert_eq!(sink.pending, 0);
    assert!(held.key().is_none());

    let snap = health.snapshot();
    assert_eq!(snap.total_failures, 2);
    assert_eq!(snap.unrecognized, 1);
}

#[test]
fn test_typing_through_poller() {
    let health = LinkHealth::new();
    let log = LogStream::new();
    let mut script = Vec::new();
    for c in b"Rust = {fast}; ok?".iter() {
        script.push(Ok(*c));
        script.push(Ok(*c));
        script.push(Ok(0x00));
    }
    script.push(Ok(0x0D));
    let ticks = script.len() + 1;

    let mut poller = Poller::new(
        &CARDKB_KEYMAP,
        Script::new(script),
        TextSink::new(String::new()),
        DriverConfig::default(),
    )
    .with_health(&health)
    .with_log(&log);

    for _ in 0..ticks {
        poller.tick();
    }

    assert_eq!(poller.sink().writer().as_str(), "Rust = {fast}; ok?\n");
}
