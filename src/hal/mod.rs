//! Hardware Abstraction Layer for RustCardKB.
//!
//! Thin wrappers around bus peripherals.
//! Translation logic stays in core modules, HAL is just I/O.

pub mod cardkb;

pub use cardkb::CardKb;
