//! Mock implementations for testing without a board.
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockFirmware`] | - | Answers aREST paths like a real board |
//! | [`MockSerialPort`] | [`SerialLink`] | In-memory link backed by a `MockFirmware` |
//! | [`MockPortOpener`] | [`PortOpener`] | Hands out clones of one `MockSerialPort` |
//!
//! `MockFirmware` is transport-agnostic; the HTTP tests serve the same
//! firmware from a local web server.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Read, Write};
//! use rs_arest::hal::MockSerialPort;
//!
//! let mut port = MockSerialPort::new();
//! port.firmware(|fw| fw.set_variable("temperature", 21.5));
//!
//! port.write_all(b"/temperature\n\r").unwrap();
//! assert_eq!(port.written(), vec!["/temperature".to_string()]);
//!
//! let mut buf = [0u8; 128];
//! let n = port.read(&mut buf).unwrap();
//! let line = std::str::from_utf8(&buf[..n]).unwrap();
//! assert!(line.contains("21.5"));
//! ```
//!
//! [`SerialLink`]: crate::traits::SerialLink
//! [`PortOpener`]: crate::traits::PortOpener

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::codec::{RETURN_VALUE_KEY, SERIAL_TERMINATOR, VARIABLES_KEY};
use crate::config::SerialConfig;
use crate::error::{BoardError, Result};
use crate::pin::{PinMode, PinNumber};
use crate::traits::{PortOpener, SerialLink};

/// How long an empty read blocks before reporting a timeout.
const IDLE_READ: Duration = Duration::from_millis(2);

// ============================================================================
// Firmware
// ============================================================================

/// A board's aREST firmware, minus the hardware.
///
/// Tracks pin modes and levels, exposes variables, and runs registered
/// functions that return fixed codes. Responses mirror the JSON shapes the
/// real firmware produces, including the `id`/`name` fields.
#[derive(Clone, Debug)]
pub struct MockFirmware {
    /// Board id reported in every response.
    pub id: String,
    /// Board name reported in every response.
    pub name: String,
    /// Pin modes set through `/mode`.
    pub modes: BTreeMap<PinNumber, PinMode>,
    /// Pin levels, set through `/digital/{pin}/{level}` or directly.
    pub levels: BTreeMap<PinNumber, i64>,
    /// Exposed variables.
    pub variables: Map<String, Value>,
    /// Functions and the return code each one answers with.
    pub functions: BTreeMap<String, i64>,
    /// Every function call received, as `(name, decoded param)`.
    pub calls: Vec<(String, String)>,
}

impl Default for MockFirmware {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            name: "mock".to_string(),
            modes: BTreeMap::new(),
            levels: BTreeMap::new(),
            variables: Map::new(),
            functions: BTreeMap::new(),
            calls: Vec::new(),
        }
    }
}

impl MockFirmware {
    /// Create a firmware with no pins, variables, or functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a variable.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) {
        self.variables.insert(name.to_string(), value.into());
    }

    /// Register a function that answers with `code`.
    pub fn set_function(&mut self, name: &str, code: i64) {
        self.functions.insert(name.to_string(), code);
    }

    /// Set the level a digital read of `pin` reports.
    pub fn set_level(&mut self, pin: PinNumber, level: i64) {
        self.levels.insert(pin, level);
    }

    /// Forget all pin configuration, like a power cycle.
    pub fn reset(&mut self) {
        self.modes.clear();
        self.levels.clear();
    }

    fn reply(&self, mut body: Map<String, Value>) -> Value {
        body.insert("id".to_string(), json!(self.id));
        body.insert("name".to_string(), json!(self.name));
        body.insert("hardware".to_string(), json!("mock"));
        body.insert("connected".to_string(), json!(true));
        Value::Object(body)
    }

    fn message(&self, text: String) -> Value {
        let mut body = Map::new();
        body.insert("message".to_string(), json!(text));
        self.reply(body)
    }

    /// Answer one request path (leading `/`, optional `?params=`).
    pub fn handle(&mut self, path: &str) -> Value {
        let path = path.trim();
        let (route, query) = match path.split_once('?') {
            Some((route, query)) => (route, Some(query)),
            None => (path, None),
        };
        let segments: Vec<&str> = route
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => {
                let mut body = Map::new();
                body.insert(VARIABLES_KEY.to_string(), Value::Object(self.variables.clone()));
                self.reply(body)
            }
            ["digital", pin] => match pin.parse::<PinNumber>() {
                Ok(pin) => {
                    let mut body = Map::new();
                    let level = self.levels.get(&pin).copied().unwrap_or(0);
                    body.insert(RETURN_VALUE_KEY.to_string(), json!(level));
                    self.reply(body)
                }
                Err(_) => self.message(format!("Invalid pin {}", pin)),
            },
            ["digital", pin, level] => match (pin.parse::<PinNumber>(), level.parse::<i64>()) {
                (Ok(pin), Ok(level)) => {
                    self.levels.insert(pin, level);
                    self.message(format!("Pin D{} set to {}", pin, level))
                }
                _ => self.message(format!("Invalid command /digital/{}/{}", pin, level)),
            },
            ["mode", pin, mode] => {
                let parsed = mode
                    .chars()
                    .next()
                    .and_then(|c| PinMode::from_char(c).ok());
                match (pin.parse::<PinNumber>(), parsed) {
                    (Ok(pin), Some(mode)) => {
                        self.modes.insert(pin, mode);
                        self.message(format!("Pin D{} set to {}", pin, mode))
                    }
                    _ => self.message(format!("Invalid command /mode/{}/{}", pin, mode)),
                }
            }
            [name] => {
                let name = decode_param(name);
                if let Some(code) = self.functions.get(&name).copied() {
                    let param = query
                        .and_then(|q| q.strip_prefix("params="))
                        .map(decode_param)
                        .unwrap_or_default();
                    self.calls.push((name, param));
                    let mut body = Map::new();
                    body.insert(RETURN_VALUE_KEY.to_string(), json!(code));
                    self.reply(body)
                } else if let Some(value) = self.variables.get(&name) {
                    let mut body = Map::new();
                    body.insert(name, value.clone());
                    self.reply(body)
                } else {
                    self.reply(Map::new())
                }
            }
            _ => self.message(format!("Unknown command {}", path)),
        }
    }
}

fn decode_param(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(b) = encoded
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ============================================================================
// Serial Port
// ============================================================================

#[derive(Debug)]
struct PendingResponse {
    ready_at: Instant,
    bytes: VecDeque<u8>,
}

#[derive(Debug, Default)]
struct PortState {
    firmware: MockFirmware,
    input: Vec<u8>,
    written: Vec<String>,
    responses: VecDeque<PendingResponse>,
    outstanding: usize,
    peak_outstanding: usize,
    silent: bool,
    fail_writes: bool,
    fail_reads: bool,
    response_delay: Duration,
    read_pause: Duration,
    chunk_size: usize,
    zero_reads: bool,
    unterminated: bool,
    clears: usize,
}

/// In-memory serial link that behaves like a board running aREST.
///
/// Clones share state, so a test can keep one handle while the transport
/// owns others. Every complete frame written is recorded and, unless the
/// port is silent, answered with one `\r\n`-terminated JSON line.
///
/// `outstanding` counts frames whose answer has not been fully read yet; its
/// peak shows whether commands were ever pipelined.
#[derive(Clone, Debug)]
pub struct MockSerialPort {
    state: Arc<Mutex<PortState>>,
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerialPort {
    /// Create a port backed by a fresh [`MockFirmware`].
    pub fn new() -> Self {
        Self::with_firmware(MockFirmware::new())
    }

    /// Create a port backed by the given firmware.
    pub fn with_firmware(firmware: MockFirmware) -> Self {
        Self {
            state: Arc::new(Mutex::new(PortState {
                firmware,
                chunk_size: usize::MAX,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inspect or change the firmware.
    pub fn firmware<R>(&self, f: impl FnOnce(&mut MockFirmware) -> R) -> R {
        f(&mut self.lock().firmware)
    }

    /// Every frame written so far, without terminators.
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Forget the recorded frames.
    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Stop answering (frames are still recorded).
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Make every write fail with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every read fail with `BrokenPipe`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Delay between a frame arriving and its answer becoming readable.
    pub fn set_response_delay(&self, delay: Duration) {
        self.lock().response_delay = delay;
    }

    /// Sleep after each successful read, to simulate a slow link.
    pub fn set_read_pause(&self, pause: Duration) {
        self.lock().read_pause = pause;
    }

    /// Largest number of bytes a single read returns.
    pub fn set_chunk_size(&self, size: usize) {
        self.lock().chunk_size = size.max(1);
    }

    /// Report an empty read as `Ok(0)` instead of a `TimedOut` error.
    pub fn set_zero_reads(&self, zero: bool) {
        self.lock().zero_reads = zero;
    }

    /// Send answers without the trailing `\r\n`.
    pub fn set_unterminated_replies(&self, unterminated: bool) {
        self.lock().unterminated = unterminated;
    }

    /// Highest number of unanswered frames seen at once.
    pub fn peak_outstanding(&self) -> usize {
        self.lock().peak_outstanding
    }

    /// Number of live handles onto this port, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    /// Number of `clear_buffers` calls.
    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }

    /// Queue raw bytes as if the board had sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().responses.push_back(PendingResponse {
            ready_at: Instant::now(),
            bytes: bytes.iter().copied().collect(),
        });
    }
}

impl PortState {
    fn accept_frames(&mut self) {
        let terminator = SERIAL_TERMINATOR.as_bytes();
        while let Some(end) = self
            .input
            .windows(terminator.len())
            .position(|w| w == terminator)
        {
            let frame: Vec<u8> = self.input.drain(..end + terminator.len()).collect();
            let path = String::from_utf8_lossy(&frame[..end]).into_owned();
            self.written.push(path.clone());

            if self.silent {
                continue;
            }
            let mut line = self.firmware.handle(&path).to_string();
            if !self.unterminated {
                line.push_str("\r\n");
            }
            self.responses.push_back(PendingResponse {
                ready_at: Instant::now() + self.response_delay,
                bytes: line.into_bytes().into(),
            });
            self.outstanding += 1;
            self.peak_outstanding = self.peak_outstanding.max(self.outstanding);
        }
    }
}

impl io::Write for MockSerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.input.extend_from_slice(buf);
        state.accept_frames();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for MockSerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, pause, zero_reads) = {
            let mut state = self.lock();
            if state.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
            }

            let now = Instant::now();
            let chunk_size = state.chunk_size;
            let read_pause = state.read_pause;
            let zero_reads = state.zero_reads;
            match state.responses.front_mut() {
                Some(pending) if pending.ready_at <= now && !buf.is_empty() => {
                    let n = pending.bytes.len().min(buf.len()).min(chunk_size);
                    for (slot, byte) in buf.iter_mut().zip(pending.bytes.drain(..n)) {
                        *slot = byte;
                    }
                    if pending.bytes.is_empty() {
                        state.responses.pop_front();
                        state.outstanding = state.outstanding.saturating_sub(1);
                    }
                    (n, read_pause, zero_reads)
                }
                _ => (0, IDLE_READ, zero_reads),
            }
        };

        std::thread::sleep(pause);
        if n == 0 && !zero_reads {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timeout"));
        }
        Ok(n)
    }
}

impl SerialLink for MockSerialPort {
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(self.clone()))
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.input.clear();
        state.responses.clear();
        state.outstanding = 0;
        state.clears += 1;
        Ok(())
    }
}

// ============================================================================
// Port Opener
// ============================================================================

/// [`PortOpener`] that always hands out the same [`MockSerialPort`].
#[derive(Clone, Debug)]
pub struct MockPortOpener {
    port: MockSerialPort,
    opens: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MockPortOpener {
    /// Create an opener for `port`.
    pub fn new(port: MockSerialPort) -> Self {
        Self {
            port,
            opens: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make subsequent opens fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoardError::Port(format!("cannot open {}", config.path)));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.port.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn read_line(port: &mut MockSerialPort) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while !out.ends_with(b"\n") {
            match port.read(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => panic!("unexpected read error: {}", e),
            }
        }
        String::from_utf8(out).unwrap()
    }

    // =========================================================================
    // Firmware Tests
    // =========================================================================

    #[test]
    fn firmware_root_lists_variables() {
        let mut fw = MockFirmware::new();
        fw.set_variable("isRebooted", false);
        let reply = fw.handle("/");
        assert_eq!(reply["variables"]["isRebooted"], json!(false));
        assert_eq!(reply["id"], json!("1"));
    }

    #[test]
    fn firmware_tracks_modes_and_levels() {
        let mut fw = MockFirmware::new();
        fw.handle("/mode/13/o");
        fw.handle("/digital/13/1");
        assert_eq!(fw.modes.get(&13), Some(&PinMode::Output));
        assert_eq!(fw.handle("/digital/13")["return_value"], json!(1));

        fw.reset();
        assert!(fw.modes.is_empty());
        assert_eq!(fw.handle("/digital/13")["return_value"], json!(0));
    }

    #[test]
    fn firmware_functions_and_variables() {
        let mut fw = MockFirmware::new();
        fw.set_function("led", 7);
        fw.set_variable("temperature", 21.5);

        assert_eq!(fw.handle("/led?params=on%20now")["return_value"], json!(7));
        assert_eq!(fw.calls, vec![("led".to_string(), "on now".to_string())]);
        assert_eq!(fw.handle("/temperature")["temperature"], json!(21.5));

        fw.set_variable("room temp", 19);
        assert_eq!(fw.handle("/room%20temp")["room temp"], json!(19));

        let unknown = fw.handle("/reboot?params=");
        assert!(unknown.get("return_value").is_none());
    }

    #[test]
    fn decode_param_handles_escapes() {
        assert_eq!(decode_param("a%20b%26c"), "a b&c");
        assert_eq!(decode_param("plain"), "plain");
        assert_eq!(decode_param("%C3%A9"), "é");
        assert_eq!(decode_param("100%"), "100%");
    }

    // =========================================================================
    // Serial Port Tests
    // =========================================================================

    #[test]
    fn port_answers_complete_frames() {
        let mut port = MockSerialPort::new();
        port.write_all(b"/digital/").unwrap();
        assert!(port.written().is_empty());

        port.write_all(b"0\n\r").unwrap();
        assert_eq!(port.written(), vec!["/digital/0".to_string()]);

        let line = read_line(&mut port);
        assert!(line.ends_with("\r\n"));
        assert!(line.contains("\"return_value\":0"));
    }

    #[test]
    fn port_respects_chunk_size() {
        let mut port = MockSerialPort::new();
        port.set_chunk_size(4);
        port.write_all(b"/\n\r").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(port.read(&mut buf).unwrap(), 4);
    }

    #[test]
    fn silent_port_records_but_never_answers() {
        let mut port = MockSerialPort::new();
        port.set_silent(true);
        port.write_all(b"/digital/0\n\r").unwrap();

        let mut buf = [0u8; 8];
        let err = port.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(port.written().len(), 1);
        assert_eq!(port.peak_outstanding(), 0);
    }

    #[test]
    fn zero_reads_and_unterminated_replies() {
        let mut port = MockSerialPort::new();
        port.set_zero_reads(true);
        port.set_unterminated_replies(true);

        let mut buf = [0u8; 128];
        assert_eq!(port.read(&mut buf).unwrap(), 0);

        port.write_all(b"/digital/0\n\r").unwrap();
        let n = port.read(&mut buf).unwrap();
        assert!(buf[..n].ends_with(b"}"));
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn pipelined_frames_raise_peak_outstanding() {
        let mut port = MockSerialPort::new();
        port.write_all(b"/digital/0\n\r/digital/1\n\r").unwrap();
        assert_eq!(port.peak_outstanding(), 2);
    }

    #[test]
    fn clear_buffers_drops_pending_answers() {
        let mut port = MockSerialPort::new();
        port.write_all(b"/\n\r").unwrap();
        port.clear_buffers().unwrap();

        let mut buf = [0u8; 8];
        assert!(port.read(&mut buf).is_err());
        assert_eq!(port.clear_count(), 1);
    }

    #[test]
    fn failing_port() {
        let mut port = MockSerialPort::new();
        port.set_fail_writes(true);
        assert_eq!(
            port.write(b"/\n\r").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );

        port.set_fail_reads(true);
        let mut buf = [0u8; 8];
        assert_eq!(
            port.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    // =========================================================================
    // Opener Tests
    // =========================================================================

    #[test]
    fn opener_shares_one_port() {
        let port = MockSerialPort::new();
        let opener = MockPortOpener::new(port.clone());
        let config = SerialConfig::new("mock");

        let mut link = opener.open(&config).unwrap();
        link.write_all(b"/\n\r").unwrap();
        assert_eq!(port.written(), vec!["/".to_string()]);
        assert_eq!(opener.open_count(), 1);

        opener.set_fail(true);
        assert!(matches!(opener.open(&config), Err(BoardError::Port(_))));
        assert_eq!(opener.open_count(), 1);
    }
}
