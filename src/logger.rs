//! Ring-buffered kernel logger with level filtering and dual serial/VGA sinks.
//!
//! Before the ring buffer is warmed up, log lines go straight to serial and VGA.
//! Once `mark_init_started()` is called, only `Fatal` keeps hitting the consoles
//! directly; everything else is buffered into the ring so a later diagnostic dump
//! (a CPU exception panic) can replay the last lines without having spammed the
//! screen during steady-state operation.

use core::fmt::{self, Write};
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use crate::safety::rdtsc;
use crate::serial;
use crate::vga_buffer::{self, Color};

static mut LOG_BUFFER_POOL: [[u8; 1024]; 2] = [[0; 1024]; 2];
static LOG_BUFFER_IN_USE: AtomicBool = AtomicBool::new(false);

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);
static BOOT_TSC: AtomicU64 = AtomicU64::new(0);
static TSC_FREQUENCY_HZ: AtomicU64 = AtomicU64::new(1_000_000_000);
static TSC_FREQ_GUESSED: AtomicBool = AtomicBool::new(true);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info.priority());
static SERIAL_RUNTIME_ENABLED: AtomicBool = AtomicBool::new(true);
static VGA_RUNTIME_ENABLED: AtomicBool = AtomicBool::new(true);
static INIT_STARTED: AtomicBool = AtomicBool::new(false);

const RINGBUF_SIZE: usize = 65536;
static RINGBUF: Mutex<RingBuffer> = Mutex::new(RingBuffer::new());

const DEFAULT_TSC_FREQUENCY_HZ: u64 = 1_000_000_000; // 1 GHz fallback

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn serial_color(self) -> &'static str {
        match self {
            LogLevel::Fatal => "\x1b[1;37;41m",
            LogLevel::Error => "\x1b[1;31m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Trace => "\x1b[90m",
        }
    }

    fn badge_colors(self) -> (Color, Color) {
        match self {
            LogLevel::Fatal => (Color::White, Color::Red),
            LogLevel::Error => (Color::LightRed, Color::Black),
            LogLevel::Warn => (Color::Yellow, Color::Black),
            LogLevel::Info => (Color::LightGreen, Color::Black),
            LogLevel::Debug => (Color::LightCyan, Color::Black),
            LogLevel::Trace => (Color::LightGray, Color::Black),
        }
    }

    const fn priority(self) -> u8 {
        match self {
            LogLevel::Fatal => 0,
            LogLevel::Error => 1,
            LogLevel::Warn => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
            LogLevel::Trace => 5,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::Fatal,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::Fatal)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::Error)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::Warn)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::Info)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::Debug)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }
}

/// Starts the TSC-derived clock and returns the detected (or guessed) frequency in Hz.
pub fn init() -> u64 {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return TSC_FREQUENCY_HZ.load(Ordering::Relaxed);
    }

    let current = read_tsc();
    BOOT_TSC.store(current, Ordering::Relaxed);

    let (frequency, guessed) = detect_tsc_frequency()
        .map(|freq| (freq, false))
        .unwrap_or((DEFAULT_TSC_FREQUENCY_HZ, true));
    TSC_FREQ_GUESSED.store(guessed, Ordering::Relaxed);
    TSC_FREQUENCY_HZ.store(frequency, Ordering::Relaxed);
    frequency
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.load(Ordering::Relaxed)
}

pub fn tsc_frequency_is_guessed() -> bool {
    TSC_FREQ_GUESSED.load(Ordering::Relaxed)
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    let current = LOG_LEVEL.load(Ordering::Relaxed);
    if level.priority() > current {
        return;
    }

    let init_started = INIT_STARTED.load(Ordering::Relaxed);

    // Before init starts everything enabled by the level filter reaches the
    // consoles. After init starts only Fatal still does; everything else
    // goes to the ring buffer only.
    let emit_serial = if init_started {
        level.priority() <= LogLevel::Fatal.priority()
    } else {
        should_emit_serial(level)
    };

    let emit_vga = if init_started {
        level.priority() <= LogLevel::Fatal.priority()
    } else {
        should_emit_vga(level)
    };

    let timestamp_us = boot_time_us();
    let mut ansi_line = None;
    if emit_serial {
        ansi_line = build_color_log_line(level, timestamp_us, args);
    }

    let mut plain_line: Option<LogLineBuffer> = None;

    if emit_serial {
        if let Some(buffer) = ansi_line.as_ref() {
            serial::write_bytes(buffer.as_bytes());
        } else {
            emit_serial_fallback(level, timestamp_us, args);
        }
    }

    if emit_vga {
        emit_vga_line(level, timestamp_us, args);
    }

    // Always mirror into the ring buffer unless we already built a plain line
    // for a console we skipped (avoid reformatting when we can reuse one).
    if plain_line.is_none() {
        plain_line = build_color_log_line_plain(level, timestamp_us, args);
    }

    if let Some(buffer) = plain_line.as_ref() {
        let mut ringbuf = RINGBUF.lock();
        ringbuf.write_bytes(buffer.as_bytes());
    }
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

pub fn boot_time_us() -> u64 {
    let start = BOOT_TSC.load(Ordering::Relaxed);
    let freq = TSC_FREQUENCY_HZ.load(Ordering::Relaxed);
    if start == 0 || freq == 0 {
        return 0;
    }

    let now = read_tsc();
    let ticks = now.saturating_sub(start);
    ticks.saturating_mul(1_000_000) / freq
}

pub fn tsc_frequency_hz() -> u64 {
    TSC_FREQUENCY_HZ.load(Ordering::Relaxed)
}

fn should_emit_serial(level: LogLevel) -> bool {
    if SERIAL_RUNTIME_ENABLED.load(Ordering::Relaxed) {
        true
    } else {
        level.priority() <= LogLevel::Error.priority()
    }
}

fn should_emit_vga(level: LogLevel) -> bool {
    if VGA_RUNTIME_ENABLED.load(Ordering::Relaxed) {
        true
    } else {
        level.priority() <= LogLevel::Error.priority()
    }
}

fn emit_serial_fallback(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
    serial::_print(format_args!(
        "{color}[{timestamp}] [{level:<5}] {message}\x1b[0m\n",
        color = level.serial_color(),
        timestamp = TimestampDisplay {
            microseconds: timestamp_us
        },
        level = LevelDisplay(level),
        message = args,
    ));
}

fn emit_vga_line(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
    // Skip VGA output until paging has mapped the buffer; early boot code can
    // run before that and a write would fault.
    if !crate::vga_buffer::is_vga_ready() {
        return;
    }

    vga_buffer::with_writer(|writer| {
        writer.with_color(Color::LightGray, Color::Black, |writer| {
            let _ = write!(
                writer,
                "[{timestamp}] ",
                timestamp = TimestampDisplay {
                    microseconds: timestamp_us,
                }
            );
        });

        let (badge_fg, badge_bg) = level.badge_colors();
        writer.with_color(badge_fg, badge_bg, |writer| {
            let _ = write!(writer, "[{level}] ", level = LevelDisplay(level));
        });

        writer.with_color(Color::White, Color::Black, |writer| {
            let _ = write!(writer, "{}", args);
        });

        let _ = writer.write_str("\n");
    });
}

fn build_color_log_line(
    level: LogLevel,
    timestamp_us: u64,
    args: fmt::Arguments<'_>,
) -> Option<LogLineBuffer> {
    let mut buffer = LogLineBuffer::new()?;
    if buffer.write_str(level.serial_color()).is_err() {
        return None;
    }
    if write!(
        buffer,
        "[{timestamp}] [{level:<5}] ",
        timestamp = TimestampDisplay {
            microseconds: timestamp_us,
        },
        level = LevelDisplay(level)
    )
    .is_err()
    {
        return None;
    }
    if fmt::write(&mut buffer, args).is_err() {
        return None;
    }
    if buffer.write_str("\x1b[0m\n").is_err() {
        return None;
    }
    Some(buffer)
}

fn build_color_log_line_plain(
    level: LogLevel,
    timestamp_us: u64,
    args: fmt::Arguments<'_>,
) -> Option<LogLineBuffer> {
    let mut buffer = LogLineBuffer::new()?;
    if write!(
        buffer,
        "[{timestamp}] [{level}] ",
        timestamp = TimestampDisplay {
            microseconds: timestamp_us,
        },
        level = LevelDisplay(level)
    )
    .is_err()
    {
        return None;
    }
    if fmt::write(&mut buffer, args).is_err() {
        return None;
    }
    if buffer.write_str("\n").is_err() {
        return None;
    }
    Some(buffer)
}

pub fn set_console_output_enabled(serial_enabled: bool, vga_enabled: bool) {
    SERIAL_RUNTIME_ENABLED.store(serial_enabled, Ordering::Relaxed);
    VGA_RUNTIME_ENABLED.store(vga_enabled, Ordering::Relaxed);
}

pub fn disable_runtime_console_output() {
    set_console_output_enabled(false, false);
}

pub fn enable_runtime_console_output() {
    set_console_output_enabled(true, true);
}

/// Marks the point after which only `Fatal` reaches the consoles directly.
pub fn mark_init_started() {
    INIT_STARTED.store(true, Ordering::Relaxed);
}

/// Snapshots the whole ring buffer (used, unused tail included) for a panic dump.
pub fn read_ringbuffer() -> [u8; RINGBUF_SIZE] {
    let ringbuf = RINGBUF.lock();
    ringbuf.buf
}

/// Current write cursor into the ring buffer, marking where valid data wraps.
pub fn ringbuffer_write_pos() -> usize {
    let ringbuf = RINGBUF.lock();
    ringbuf.write_pos
}

fn read_tsc() -> u64 {
    rdtsc()
}

fn detect_tsc_frequency() -> Option<u64> {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{__cpuid, __cpuid_count};

        let highest_leaf = __cpuid(0).eax;

        if highest_leaf >= 0x15 {
            let leaf = __cpuid_count(0x15, 0);
            let denom = leaf.eax as u64;
            let numer = leaf.ebx as u64;
            let freq = leaf.ecx as u64;

            if denom != 0 && numer != 0 {
                if freq != 0 {
                    return Some((freq * numer) / denom);
                } else if let Some(base_freq) = detect_base_frequency_mhz() {
                    return Some(((base_freq as u64) * 1_000_000 * numer) / denom);
                }
            } else if freq != 0 {
                return Some(freq);
            }
        }

        if highest_leaf >= 0x16 {
            if let Some(base_freq) = detect_base_frequency_mhz() {
                return Some(base_freq as u64 * 1_000_000);
            }
        }
    }

    None
}

fn detect_base_frequency_mhz() -> Option<u32> {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::__cpuid;
        let leaf = __cpuid(0x16);
        if leaf.eax != 0 {
            return Some(leaf.eax);
        }
    }
    None
}

struct TimestampDisplay {
    microseconds: u64,
}

impl fmt::Display for TimestampDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.microseconds / 1_000_000;
        let micros = self.microseconds % 1_000_000;
        write!(f, "{:>5}.{:06}", seconds, micros)
    }
}

struct LevelDisplay(LogLevel);

impl fmt::Display for LevelDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5}", self.0.as_str())
    }
}

struct LogLineBuffer {
    buf: &'static mut [u8; 1024],
    len: usize,
}

impl LogLineBuffer {
    fn new() -> Option<Self> {
        // Try to take the primary pool slot; fall back to the secondary one
        // for logging that nests inside another in-flight log call.
        if LOG_BUFFER_IN_USE
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[0]) };
            Some(Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
            })
        } else {
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[1]) };
            Some(Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
            })
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Drop for LogLineBuffer {
    fn drop(&mut self) {
        LOG_BUFFER_IN_USE.store(false, Ordering::Release);
    }
}

impl fmt::Write for LogLineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

struct RingBuffer {
    buf: [u8; RINGBUF_SIZE],
    write_pos: usize,
}

impl RingBuffer {
    const fn new() -> Self {
        Self {
            buf: [0; RINGBUF_SIZE],
            write_pos: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if self.write_pos >= RINGBUF_SIZE {
            self.write_pos %= RINGBUF_SIZE;
        }

        for &byte in bytes {
            self.buf[self.write_pos] = byte;
            self.write_pos += 1;
            if self.write_pos >= RINGBUF_SIZE {
                self.write_pos = 0;
            }
        }
    }
}
