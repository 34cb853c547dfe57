//! RustCardKB - Main entry point
//!
//! On ESP-IDF:
//! 1. Bring up I2C0 and probe the CardKB
//! 2. Start the poll task (20 ms period)
//! 3. Drain the log stream to the console forever
//!
//! On host: replay a typed phrase through a scripted transport, then cancel
//! the poller and print what the sink received.

use core::fmt;
use std::io::Write as _;

use rust_cardkb::logging::{LogRecord, LOG_STREAM};

/// Build banner, stamped by build.rs.
const VERSION: &str = env!("VERSION_STRING");

/// Text sink backend writing to stdout.
struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut out = std::io::stdout();
        out.write_all(s.as_bytes()).map_err(|_| fmt::Error)?;
        out.flush().map_err(|_| fmt::Error)
    }
}

/// Print every pending log record. Returns how many were printed.
fn drain_logs() -> usize {
    let mut console = Console;
    let mut printed = 0;
    while let Some(record) = LOG_STREAM.drain() {
        print_record(&mut console, &record);
        printed += 1;
    }
    let dropped = LOG_STREAM.dropped();
    if dropped > 0 {
        println!("[log] {} records dropped", dropped);
        LOG_STREAM.reset_dropped();
    }
    printed
}

fn print_record(console: &mut Console, record: &LogRecord) {
    // Console write failures have nowhere to go.
    let _ = record.write_to(console);
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::thread;
    use std::time::Duration;

    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::hal::prelude::*;
    use esp_idf_svc::sys::EspError;

    use rust_cardkb::hal::CardKb;
    use rust_cardkb::logging::LogLevel;
    use rust_cardkb::{DriverConfig, PollControl, Poller, TextSink, CARDKB_KEYMAP, LINK_HEALTH};

    use super::{drain_logs, Console};

    static CONTROL: PollControl = PollControl::new();

    /// Poll task stack (bytes).
    const POLL_STACK_SIZE: usize = 4096;

    /// Log drain interval.
    const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

    #[derive(Debug)]
    pub enum FirmwareError {
        Esp(EspError),
        Spawn,
    }

    impl From<EspError> for FirmwareError {
        fn from(e: EspError) -> Self {
            FirmwareError::Esp(e)
        }
    }

    pub fn run() -> Result<(), FirmwareError> {
        esp_idf_svc::sys::link_patches();
        println!("{}", super::VERSION);

        let peripherals = Peripherals::take()?;
        let config = DriverConfig::default();

        // Grove port: SDA = GPIO2, SCL = GPIO1
        let i2c_config = I2cConfig::new().baudrate(100.kHz().into());
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            peripherals.pins.gpio2,
            peripherals.pins.gpio1,
            &i2c_config,
        )?;

        let mut keyboard = CardKb::new(i2c, &config);
        match keyboard.probe() {
            Ok(()) => println!("{} found at 0x{:02X}", config.device_name, keyboard.address()),
            // Keep polling: the keyboard may be plugged in later
            Err(e) => println!("{} not answering at 0x{:02X}: {}", config.device_name, keyboard.address(), e),
        }

        if cfg!(debug_assertions) {
            rust_cardkb::LOG_STREAM.set_level(LogLevel::Debug);
        }

        let _poll_task = thread::Builder::new()
            .name("cardkb-poll".into())
            .stack_size(POLL_STACK_SIZE)
            .spawn(move || {
                let mut poller = Poller::new(&CARDKB_KEYMAP, keyboard, TextSink::new(Console), config);
                poller.run(&CONTROL, &mut FreeRtos)
            })
            .map_err(|_| FirmwareError::Spawn)?;

        let mut was_failing = false;
        loop {
            drain_logs();

            let failing = LINK_HEALTH.is_failing();
            if failing != was_failing {
                let snap = LINK_HEALTH.snapshot();
                println!("[link] failing={} last={:?} total={}", failing, snap.last_fault, snap.total_failures);
                was_failing = failing;
            }

            thread::sleep(DRAIN_INTERVAL);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use embedded_hal::delay::DelayNs;

    use rust_cardkb::logging::LogLevel;
    use rust_cardkb::{
        DriverConfig, PollControl, Poller, TextSink, Transport, TransportError, CARDKB_KEYMAP,
        LINK_HEALTH, LOG_STREAM,
    };

    use super::drain_logs;

    const PHRASE: &str = "Hello, CardKB!\n";

    /// Ticks a key stays down, then ticks released.
    const HOLD_TICKS: usize = 3;
    const GAP_TICKS: usize = 2;

    /// Script byte standing in for a failed bus read.
    const BUS_ERROR: u8 = 0xFF;

    static CONTROL: PollControl = PollControl::new();

    /// Transport replaying a phrase as the controller would report it.
    struct Replay {
        codes: std::vec::IntoIter<u8>,
        finished: Arc<AtomicBool>,
    }

    impl Replay {
        fn typing(text: &str, finished: Arc<AtomicBool>) -> Self {
            let mut codes = Vec::new();
            for c in text.bytes() {
                let raw = if c == b'\n' { 0x0D } else { c };
                codes.extend(std::iter::repeat(raw).take(HOLD_TICKS));
                codes.extend(std::iter::repeat(0x00).take(GAP_TICKS));
            }
            // Exercise the skip path once
            codes.insert(HOLD_TICKS, BUS_ERROR);
            Self {
                codes: codes.into_iter(),
                finished,
            }
        }
    }

    impl Transport for Replay {
        fn read_status(&mut self) -> Result<u8, TransportError> {
            match self.codes.next() {
                Some(BUS_ERROR) => Err(TransportError::Bus),
                Some(raw) => Ok(raw),
                None => {
                    self.finished.store(true, Ordering::Release);
                    Ok(0x00)
                }
            }
        }
    }

    struct SleepDelay;

    impl DelayNs for SleepDelay {
        fn delay_ns(&mut self, ns: u32) {
            thread::sleep(Duration::from_nanos(ns as u64));
        }

        fn delay_ms(&mut self, ms: u32) {
            thread::sleep(Duration::from_millis(ms as u64));
        }
    }

    pub fn run() {
        println!("{} (host replay)", super::VERSION);
        LOG_STREAM.set_level(LogLevel::Debug);

        let finished = Arc::new(AtomicBool::new(false));
        let transport = Replay::typing(PHRASE, Arc::clone(&finished));
        let config = DriverConfig::with_period_ms(2);

        let poll_task = thread::spawn(move || {
            let mut poller = Poller::new(&CARDKB_KEYMAP, transport, TextSink::new(String::new()), config);
            let ticks = poller.run(&CONTROL, &mut SleepDelay);
            (ticks, poller.into_parts())
        });

        while !finished.load(Ordering::Acquire) {
            drain_logs();
            thread::sleep(Duration::from_millis(10));
        }

        CONTROL.cancel();
        let Ok((ticks, (_, sink, held))) = poll_task.join() else {
            eprintln!("poll task panicked");
            std::process::exit(1);
        };
        drain_logs();

        println!("ticks:  {}", ticks);
        println!("held:   {:?}", held);
        println!("link:   {:?}", LINK_HEALTH.snapshot());
        print!("typed:  {}", sink.writer());
    }
}

#[cfg(target_os = "espidf")]
fn main() -> Result<(), firmware::FirmwareError> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    host::run()
}
