//! Non-blocking logging for the poll loop.
//!
//! # Architecture
//!
//! ```text
//! Poll loop              LogStream            Drain task
//! ─────────              ─────────            ──────────
//!
//! kb_warn!() ──────────▶ [R0][R1][R2] ──────▶ console / UART
//! non-blocking            lock-free           blocking ok
//! ```
//!
//! # Rules
//!
//! - The poll loop never blocks on logging; a full ring drops the record.
//! - Records below the stream's level threshold are discarded at push time.
//! - One drain task per stream.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 96;

/// Default ring size (number of records).
pub const LOG_BUFFER_SIZE: usize = 64;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Convert from raw u8 value (saturating to `Trace`).
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// A single log record.
#[derive(Clone, Copy)]
pub struct LogRecord {
    /// Milliseconds since the poller started.
    pub timestamp_ms: u32,
    pub level: LogLevel,
    len: u8,
    msg: [u8; MAX_MSG_LEN],
}

impl LogRecord {
    const BLANK: Self = Self {
        timestamp_ms: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message text. Truncation may split a UTF-8 sequence; the valid
    /// prefix is returned in that case.
    pub fn message(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Format as `[timestamp_ms] LEVEL: message`.
    pub fn write_to<W: core::fmt::Write>(&self, out: &mut W) -> core::fmt::Result {
        writeln!(
            out,
            "[{:8}] {}: {}",
            self.timestamp_ms,
            self.level.as_str(),
            self.message()
        )
    }
}

impl core::fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogRecord")
            .field("timestamp_ms", &self.timestamp_ms)
            .field("level", &self.level)
            .field("msg", &self.message())
            .finish()
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const NOT_READY: AtomicBool = AtomicBool::new(false);

/// Lock-free log ring (many producers, one drain).
///
/// Producers reserve a slot with a CAS on the write index, fill it, then
/// publish it through the slot's ready flag. The drain only consumes
/// published slots, in order.
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    records: UnsafeCell<[LogRecord; N]>,
    ready: [AtomicBool; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
    level: AtomicU8,
}

// SAFETY: A slot is written only by the producer that reserved it and read
// only by the single drain after its ready flag is published.
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: usize = N - 1;

    /// Create a new empty log stream at `Info` level.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        Self {
            records: UnsafeCell::new([LogRecord::BLANK; N]),
            ready: [NOT_READY; N],
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            level: AtomicU8::new(LogLevel::Info as u8),
        }
    }

    /// Most verbose level accepted by `push`.
    #[inline]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// True if a record at `level` would be kept.
    #[inline]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    /// Push a record (never blocks).
    ///
    /// Returns `true` if queued, `false` if filtered or dropped (ring full).
    pub fn push(&self, timestamp_ms: u32, level: LogLevel, msg: &[u8]) -> bool {
        if !self.enabled(level) {
            return false;
        }

        let mut write = self.write_idx.load(Ordering::Relaxed);
        loop {
            let read = self.read_idx.load(Ordering::Acquire);
            if write.wrapping_sub(read) >= N as u32 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.write_idx.compare_exchange_weak(
                write,
                write.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => write = current,
            }
        }

        let idx = (write as usize) & Self::MASK;
        let len = msg.len().min(MAX_MSG_LEN);

        // SAFETY: The CAS above gave this producer exclusive ownership of
        // slot `idx` until its ready flag is set.
        unsafe {
            let record = &mut (*self.records.get())[idx];
            record.timestamp_ms = timestamp_ms;
            record.level = level;
            record.len = len as u8;
            record.msg[..len].copy_from_slice(&msg[..len]);
        }

        self.ready[idx].store(true, Ordering::Release);
        true
    }

    /// Take the oldest published record.
    ///
    /// Returns `None` if the ring is empty or the oldest slot is still
    /// being written.
    pub fn drain(&self) -> Option<LogRecord> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        let idx = (read as usize) & Self::MASK;
        if !self.ready[idx].load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: Single drain; the slot is published and no producer can
        // reserve it again until read_idx moves past it.
        let record = unsafe { (*self.records.get())[idx] };

        self.ready[idx].store(false, Ordering::Relaxed);
        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(record)
    }

    /// Get count of dropped records.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Number of records waiting to be drained.
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Global stream used by the poller.
pub static LOG_STREAM: LogStream = LogStream::new();

/// Format arguments into a byte buffer, truncating at its end.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct Cursor<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl Write for Cursor<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let room = self.buf.len() - self.pos;
            let n = s.len().min(room);
            self.buf[self.pos..self.pos + n].copy_from_slice(&s.as_bytes()[..n]);
            self.pos += n;
            Ok(())
        }
    }

    let mut cursor = Cursor { buf, pos: 0 };
    let _ = core::fmt::write(&mut cursor, args);
    cursor.pos
}

/// Non-blocking log macro.
///
/// # Example
///
/// ```ignore
/// kb_log!(LogLevel::Info, LOG_STREAM, now_ms, "raw 0x{:02X}", raw);
/// ```
#[macro_export]
macro_rules! kb_log {
    ($level:expr, $stream:expr, $timestamp:expr, $($arg:tt)*) => {{
        let level = $level;
        if $stream.enabled(level) {
            let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
            let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
            $stream.push($timestamp, level, &buf[..len]);
        }
    }};
}

#[macro_export]
macro_rules! kb_error {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::kb_log!($crate::logging::LogLevel::Error, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! kb_warn {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::kb_log!($crate::logging::LogLevel::Warn, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! kb_info {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::kb_log!($crate::logging::LogLevel::Info, $stream, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! kb_debug {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::kb_log!($crate::logging::LogLevel::Debug, $stream, $timestamp, $($arg)*)
    };
}

/// Maximum verbosity: one record per emitted batch.
#[macro_export]
macro_rules! kb_trace {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::kb_log!($crate::logging::LogLevel::Trace, $stream, $timestamp, $($arg)*)
    };
}
