//! Key translation state machine.
//!
//! Pure logic, no hardware dependencies. Consumes one raw status byte per
//! poll, produces a bracketed batch of key events. Fully testable on host.
//!
//! # Transitions
//!
//! - `0x00` releases the held key (shift released first).
//! - An unmapped code changes nothing.
//! - The held code again is a no-op tick, not a re-press.
//! - A different mapped code releases the held key, then presses the new one.

use crate::keymap::{Keymap, LogicalKey, RAW_RELEASE};

/// Largest batch one tick can produce: full release plus full press.
pub const MAX_EVENTS_PER_TICK: usize = 4;

/// Key currently considered pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HeldState {
    /// No key down.
    #[default]
    Idle,
    /// Exactly one key down, with the shift requirement latched at press time.
    Held { key: LogicalKey, shift: bool },
}

impl HeldState {
    /// Held key, if any.
    #[inline]
    pub fn key(&self) -> Option<LogicalKey> {
        match *self {
            HeldState::Idle => None,
            HeldState::Held { key, .. } => Some(key),
        }
    }

    /// True while the synthetic shift is down.
    #[inline]
    pub fn shift(&self) -> bool {
        matches!(*self, HeldState::Held { shift: true, .. })
    }
}

/// Event delivered to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    ShiftDown,
    ShiftUp,
    KeyDown(LogicalKey),
    KeyUp(LogicalKey),
}

/// Ordered events produced by one tick.
///
/// Fixed capacity, no allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventBatch {
    events: [KeyEvent; MAX_EVENTS_PER_TICK],
    len: u8,
}

impl EventBatch {
    /// Empty batch (no-op tick).
    pub const EMPTY: Self = Self {
        events: [KeyEvent::ShiftUp; MAX_EVENTS_PER_TICK],
        len: 0,
    };

    #[inline]
    fn push(&mut self, event: KeyEvent) {
        // Capacity is exact for release + press, never exceeded by `step`.
        self.events[self.len as usize] = event;
        self.len += 1;
    }

    fn push_press(&mut self, key: LogicalKey, shift: bool) {
        if shift {
            self.push(KeyEvent::ShiftDown);
        }
        self.push(KeyEvent::KeyDown(key));
    }

    fn push_release(&mut self, key: LogicalKey, shift: bool) {
        if shift {
            self.push(KeyEvent::ShiftUp);
        }
        self.push(KeyEvent::KeyUp(key));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[KeyEvent] {
        &self.events[..self.len as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = KeyEvent> + '_ {
        self.as_slice().iter().copied()
    }
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Outcome classification of a tick, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Events were produced.
    Changed,
    /// Recognized input (or release), nothing to report.
    Steady,
    /// Nonzero code with no keymap entry.
    Unrecognized,
}

/// Transition function with its classification.
///
/// Returns the events for this tick, the next held state and what kind of
/// tick it was. Never fails: unmapped codes leave `state` as it was.
pub fn transition(state: HeldState, raw: u8, keymap: &Keymap) -> (EventBatch, HeldState, StepKind) {
    let mut batch = EventBatch::EMPTY;

    if raw == RAW_RELEASE {
        if let HeldState::Held { key, shift } = state {
            batch.push_release(key, shift);
        }
        return (batch, HeldState::Idle, StepKind::from_batch(&batch));
    }

    let Some((key, shift)) = keymap.lookup(raw) else {
        return (batch, state, StepKind::Unrecognized);
    };
    let next = HeldState::Held { key, shift };

    match state {
        HeldState::Held { .. } if state == next => {}
        HeldState::Held { key: old, shift: old_shift } => {
            batch.push_release(old, old_shift);
            batch.push_press(key, shift);
        }
        HeldState::Idle => batch.push_press(key, shift),
    }

    (batch, next, StepKind::from_batch(&batch))
}

/// Transition function.
///
/// Same as [`transition`] without the classification.
#[inline]
pub fn step(state: HeldState, raw: u8, keymap: &Keymap) -> (EventBatch, HeldState) {
    let (batch, next, _) = transition(state, raw, keymap);
    (batch, next)
}

impl StepKind {
    #[inline]
    fn from_batch(batch: &EventBatch) -> Self {
        if batch.is_empty() {
            StepKind::Steady
        } else {
            StepKind::Changed
        }
    }
}

/// Translator owning the held state for one device.
///
/// # Example
///
/// ```
/// use rust_cardkb::keymap::{LogicalKey, CARDKB_KEYMAP};
/// use rust_cardkb::translator::{KeyEvent, Translator};
///
/// let mut translator = Translator::new(&CARDKB_KEYMAP);
///
/// let batch = translator.step(b'A');
/// assert_eq!(batch.as_slice(), &[KeyEvent::ShiftDown, KeyEvent::KeyDown(LogicalKey::A)]);
///
/// let batch = translator.step(0x00);
/// assert_eq!(batch.as_slice(), &[KeyEvent::ShiftUp, KeyEvent::KeyUp(LogicalKey::A)]);
/// ```
pub struct Translator<'a> {
    keymap: &'a Keymap,
    state: HeldState,
    last_kind: StepKind,
}

impl<'a> Translator<'a> {
    /// Create a translator in the `Idle` state.
    pub fn new(keymap: &'a Keymap) -> Self {
        Self {
            keymap,
            state: HeldState::Idle,
            last_kind: StepKind::Steady,
        }
    }

    /// Feed one raw byte, returning the events to deliver.
    #[inline]
    pub fn step(&mut self, raw: u8) -> EventBatch {
        let (batch, next, kind) = transition(self.state, raw, self.keymap);
        self.state = next;
        self.last_kind = kind;
        batch
    }

    /// Current held state.
    #[inline]
    pub fn state(&self) -> HeldState {
        self.state
    }

    /// Classification of the most recent `step`.
    #[inline]
    pub fn last_kind(&self) -> StepKind {
        self.last_kind
    }

    pub fn keymap(&self) -> &'a Keymap {
        self.keymap
    }
}
