//! # RustCardKB
//!
//! Polled driver core for the M5Stack CardKB, a keyboard controller that
//! reports one key at a time as a single status byte.
//!
//! ## Architecture
//!
//! ```text
//! Transport ──raw──▶ Translator ──events──▶ dispatch ──▶ EventSink
//!     ▲                  (held state)
//!     └──────── Poller (fixed period, cancellable) ────────┘
//! ```
//!
//! - [`keymap`]: raw byte → logical key + shift requirement (O(1) table)
//! - [`translator`]: the held-key state machine, pure and host-testable
//! - [`poller`]: one tick at a time, join-on-cancel shutdown
//! - [`sink`]: event backend interface, one `sync()` per changed tick
//!
//! Hardware access lives in [`hal`]; everything else runs on host.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod fault;
pub mod hal;
pub mod keymap;
pub mod logging;
pub mod poller;
pub mod sink;
pub mod translator;
pub mod transport;

pub use config::DriverConfig;
pub use fault::{LinkHealth, LinkFault, LINK_HEALTH};
pub use keymap::{Capabilities, Keymap, KeymapEntry, LogicalKey, CARDKB_KEYMAP};
pub use logging::LOG_STREAM;
pub use poller::{PollControl, Poller, TickOutcome};
pub use sink::{dispatch, EventSink, TextSink};
pub use translator::{EventBatch, HeldState, KeyEvent, Translator};
pub use transport::{Transport, TransportError};
