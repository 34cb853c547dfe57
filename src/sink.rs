//! Module: sink
//!
//! Purpose: Delivery of translated key events to the host's input backend.
//!
//! Architecture:
//! - [`EventSink`]: the backend interface (press/release, shift, sync barrier).
//! - [`dispatch`]: forwards one tick's batch in order, then one `sync()`.
//!   Empty batches produce no calls at all.
//! - [`TextSink`]: renders presses as characters into any `core::fmt::Write`.
//!
//! Safety: Safe. No unsafe blocks.

use crate::keymap::{Capabilities, LogicalKey};
use crate::translator::{EventBatch, KeyEvent};

/// Consumer of key events.
pub trait EventSink {
    /// Declare producible keys once, before the first event.
    fn register(&mut self, caps: &Capabilities) {
        let _ = caps;
    }

    fn press(&mut self, key: LogicalKey);

    fn release(&mut self, key: LogicalKey);

    fn press_shift(&mut self);

    fn release_shift(&mut self);

    /// Barrier: a consistent frame of key changes is complete.
    fn sync(&mut self);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn register(&mut self, caps: &Capabilities) {
        (**self).register(caps)
    }

    fn press(&mut self, key: LogicalKey) {
        (**self).press(key)
    }

    fn release(&mut self, key: LogicalKey) {
        (**self).release(key)
    }

    fn press_shift(&mut self) {
        (**self).press_shift()
    }

    fn release_shift(&mut self) {
        (**self).release_shift()
    }

    fn sync(&mut self) {
        (**self).sync()
    }
}

/// Deliver one tick's events to `sink`.
///
/// Returns `true` if anything was delivered (and a `sync()` issued).
pub fn dispatch<S: EventSink + ?Sized>(batch: &EventBatch, sink: &mut S) -> bool {
    if batch.is_empty() {
        return false;
    }

    for event in batch.iter() {
        match event {
            KeyEvent::ShiftDown => sink.press_shift(),
            KeyEvent::ShiftUp => sink.release_shift(),
            KeyEvent::KeyDown(key) => sink.press(key),
            KeyEvent::KeyUp(key) => sink.release(key),
        }
    }
    sink.sync();
    true
}

/// Sink that types characters into a text writer.
///
/// A character is written when a key goes down, using the shift state
/// current at that moment. Arrows produce no output.
pub struct TextSink<W: core::fmt::Write> {
    out: W,
    shift: bool,
    registered: Option<Capabilities>,
    frames: u32,
}

impl<W: core::fmt::Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shift: false,
            registered: None,
            frames: 0,
        }
    }

    /// Capabilities received through `register`, if any.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.registered.as_ref()
    }

    /// Number of completed frames (`sync` calls).
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: core::fmt::Write> EventSink for TextSink<W> {
    fn register(&mut self, caps: &Capabilities) {
        self.registered = Some(*caps);
    }

    fn press(&mut self, key: LogicalKey) {
        if let Some(c) = key.to_char(self.shift) {
            // A full writer loses the character; there is nowhere to report it.
            let _ = self.out.write_char(c);
        }
    }

    fn release(&mut self, _key: LogicalKey) {}

    fn press_shift(&mut self) {
        self.shift = true;
    }

    fn release_shift(&mut self) {
        self.shift = false;
    }

    fn sync(&mut self) {
        self.frames = self.frames.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::CARDKB_KEYMAP;
    use crate::translator::Translator;

    #[derive(Default)]
    struct CallLog {
        calls: Vec<&'static str>,
    }

    impl EventSink for CallLog {
        fn press(&mut self, _key: LogicalKey) {
            self.calls.push("press");
        }
        fn release(&mut self, _key: LogicalKey) {
            self.calls.push("release");
        }
        fn press_shift(&mut self) {
            self.calls.push("press_shift");
        }
        fn release_shift(&mut self) {
            self.calls.push("release_shift");
        }
        fn sync(&mut self) {
            self.calls.push("sync");
        }
    }

    #[test]
    fn test_empty_batch_no_sync() {
        let mut sink = CallLog::default();
        assert!(!dispatch(&EventBatch::EMPTY, &mut sink));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_one_sync_after_switch() {
        let mut translator = Translator::new(&CARDKB_KEYMAP);
        let mut sink = CallLog::default();

        dispatch(&translator.step(b'1'), &mut sink);
        dispatch(&translator.step(b'!'), &mut sink);

        assert_eq!(
            sink.calls,
            vec!["press", "sync", "release", "press_shift", "press", "sync"]
        );
    }

    #[test]
    fn test_text_sink_types_shifted_chars() {
        let mut translator = Translator::new(&CARDKB_KEYMAP);
        let mut sink = TextSink::new(String::new());

        for &raw in b"Hi!\x00 ok?\x00" {
            dispatch(&translator.step(raw), &mut sink);
        }

        assert_eq!(sink.writer().as_str(), "Hi! ok?");
    }

    #[test]
    fn test_text_sink_register_and_frames() {
        let mut sink = TextSink::new(String::new());
        assert!(sink.capabilities().is_none());

        sink.register(&CARDKB_KEYMAP.capabilities());
        assert!(sink.capabilities().map(|c| c.shift).unwrap_or(false));

        let mut translator = Translator::new(&CARDKB_KEYMAP);
        dispatch(&translator.step(0xB5), &mut sink); // Up: no character
        dispatch(&translator.step(0x00), &mut sink);
        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.into_inner(), "");
    }
}
