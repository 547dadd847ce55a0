//! Transport configuration.
//!
//! Plain builder-style structs with serde support so they can be embedded in
//! an application's own config file.
//!
//! # Example
//!
//! ```rust
//! use rs_arest::config::{HttpConfig, SerialConfig};
//!
//! let http = HttpConfig::new("http://192.168.1.50")
//!     .with_timeout_ms(2_000)
//!     .with_debug(true);
//!
//! let serial = SerialConfig::new("/dev/ttyUSB0")
//!     .with_baud_rate(9600)
//!     .with_response_timeout_ms(5_000);
//!
//! assert_eq!(http.timeout().unwrap().as_millis(), 2_000);
//! assert_eq!(serial.baud_rate, 9600);
//! ```

use std::time::Duration;

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP transport configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the board, e.g. `http://192.168.1.50`
    pub base_url: String,
    /// Per-request timeout in milliseconds (0 = no timeout)
    pub timeout_ms: u64,
    /// Log request paths and raw responses at debug level
    pub debug: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            timeout_ms: 0,
            debug: false,
        }
    }
}

impl HttpConfig {
    /// Create a config for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Enable or disable debug tracing
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Per-request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// ============================================================================
// Serial Config
// ============================================================================

/// Number of data bits per character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DataBits {
    /// 5 bits
    Five,
    /// 6 bits
    Six,
    /// 7 bits
    Seven,
    /// 8 bits
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Number of stop bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

/// Serial transport configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Watchdog timeout: longest silence tolerated while a response is pending
    pub response_timeout_ms: u64,
    /// Port read timeout; bounds how quickly the read loop notices shutdown
    pub read_poll_ms: u64,
    /// Pause after opening the port before probing (boards reset on open)
    pub settle_delay_ms: u64,
    /// Pause between disconnect and connect during a reconnect
    pub reconnect_delay_ms: u64,
    /// Pause between automatic recovery attempts
    pub retry_pause_ms: u64,
    /// Log request paths and raw responses at debug level
    pub debug: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            response_timeout_ms: 5_000,
            read_poll_ms: 50,
            settle_delay_ms: 1_000,
            reconnect_delay_ms: 1_000,
            retry_pause_ms: 1,
            debug: false,
        }
    }
}

impl SerialConfig {
    /// Create a config for the given port path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Set data bits, parity and stop bits
    pub fn with_framing(mut self, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        self.data_bits = data_bits;
        self.parity = parity;
        self.stop_bits = stop_bits;
        self
    }

    /// Set the watchdog timeout
    pub fn with_response_timeout_ms(mut self, ms: u64) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    /// Set the port read timeout
    pub fn with_read_poll_ms(mut self, ms: u64) -> Self {
        self.read_poll_ms = ms.max(1);
        self
    }

    /// Set the post-open settle delay
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Set the disconnect/connect pause used by reconnect
    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    /// Set the pause between recovery attempts
    pub fn with_retry_pause_ms(mut self, ms: u64) -> Self {
        self.retry_pause_ms = ms;
        self
    }

    /// Enable or disable debug tracing
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Watchdog timeout.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Port read timeout.
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms.max(1))
    }

    /// Post-open settle delay.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Reconnect pause.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Recovery retry pause.
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.base_url, "http://localhost");
        assert!(config.timeout().is_none());
        assert!(!config.debug);
    }

    #[test]
    fn http_config_base_strips_trailing_slash() {
        let config = HttpConfig::new("http://board.local/");
        assert_eq!(config.base(), "http://board.local");
    }

    #[test]
    fn http_config_timeout() {
        let config = HttpConfig::new("http://board.local").with_timeout_ms(1500);
        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.response_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.retry_pause(), Duration::from_millis(1));
    }

    #[test]
    fn serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0")
            .with_baud_rate(9600)
            .with_framing(DataBits::Seven, Parity::Even, StopBits::Two)
            .with_response_timeout_ms(200)
            .with_settle_delay_ms(0)
            .with_reconnect_delay_ms(10)
            .with_retry_pause_ms(5)
            .with_debug(true);

        assert_eq!(config.path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.response_timeout(), Duration::from_millis(200));
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(10));
        assert_eq!(config.retry_pause(), Duration::from_millis(5));
        assert!(config.debug);
    }

    #[test]
    fn serial_read_poll_never_zero() {
        let config = SerialConfig::default().with_read_poll_ms(0);
        assert_eq!(config.read_poll(), Duration::from_millis(1));
    }

    #[test]
    fn serial_config_from_partial_json() {
        let config: SerialConfig =
            serde_json::from_str(r#"{"path": "/dev/ttyUSB0", "baud_rate": 57600}"#).unwrap();
        assert_eq!(config.path, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.response_timeout_ms, 5_000);
        assert_eq!(config.parity, Parity::None);
    }
}
