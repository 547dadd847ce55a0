//! Named board handle with digital-pin shortcuts.
//!
//! Automation layers address pins by string and do not want to manage pin
//! modes. [`Adaptor`] parses the pin, configures it on first use, and then
//! reads or writes it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rs_arest::{Adaptor, Context, HttpConfig, HttpTransport};
//!
//! # async fn run() -> rs_arest::Result<()> {
//! let board = Arc::new(HttpTransport::new(HttpConfig::new("http://10.0.0.7"))?);
//! let adaptor = Adaptor::new("bench", board);
//! let ctx = Context::background();
//!
//! adaptor.connect(&ctx).await?;
//! adaptor.digital_write(&ctx, "13", 1).await?; // configures pin 13 as output first
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::context::Context;
use crate::error::{BoardError, Result};
use crate::pin::{PinMode, PinNumber};
use crate::traits::Board;

/// A [`Board`] with a name and pin-string convenience methods.
pub struct Adaptor<B: Board + ?Sized> {
    name: RwLock<String>,
    board: Arc<B>,
}

impl<B: Board + ?Sized> Adaptor<B> {
    /// Wrap `board`.
    pub fn new(name: impl Into<String>, board: Arc<B>) -> Self {
        Self {
            name: RwLock::new(name.into()),
            board,
        }
    }

    /// Adaptor name.
    pub fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rename the adaptor.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// The wrapped board.
    pub fn board(&self) -> &Arc<B> {
        &self.board
    }

    /// Connect the board.
    pub async fn connect(&self, ctx: &Context) -> Result<()> {
        self.board.connect(ctx).await
    }

    /// Disconnect the board.
    pub async fn disconnect(&self, ctx: &Context) -> Result<()> {
        self.board.disconnect(ctx).await
    }

    /// Release the board; same as [`disconnect`](Self::disconnect).
    pub async fn finalize(&self, ctx: &Context) -> Result<()> {
        self.disconnect(ctx).await
    }

    /// Reconnect the board and replay its pins.
    pub async fn reconnect(&self, ctx: &Context) -> Result<()> {
        self.board.reconnect(ctx).await
    }

    /// Write `level` to `pin`, configuring it as output if it is unknown.
    pub async fn digital_write(&self, ctx: &Context, pin: &str, level: u8) -> Result<()> {
        let pin = parse_pin(pin)?;
        if !self.board.pins().contains_key(&pin) {
            self.board.set_pin_mode(ctx, pin, PinMode::Output).await?;
        }
        self.board.digital_write(ctx, pin, level).await
    }

    /// Read `pin`, configuring it as input if it is unknown.
    pub async fn digital_read(&self, ctx: &Context, pin: &str) -> Result<i64> {
        let pin = parse_pin(pin)?;
        if !self.board.pins().contains_key(&pin) {
            self.board.set_pin_mode(ctx, pin, PinMode::Input).await?;
        }
        self.board.digital_read(ctx, pin).await
    }

    /// Read one named variable.
    pub async fn value_read(&self, ctx: &Context, name: &str) -> Result<Value> {
        self.board.read_value(ctx, name).await
    }
}

fn parse_pin(pin: &str) -> Result<PinNumber> {
    pin.trim()
        .parse()
        .map_err(|_| BoardError::InvalidPin(pin.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use crate::hal::mock::{MockPortOpener, MockSerialPort};
    use crate::pin::{Level, Pin};
    use crate::transport::SerialTransport;

    fn adaptor() -> (Adaptor<SerialTransport>, MockSerialPort) {
        let port = MockSerialPort::new();
        let config = SerialConfig::new("mock")
            .with_settle_delay_ms(0)
            .with_read_poll_ms(2);
        let board = SerialTransport::new(config, MockPortOpener::new(port.clone()));
        (Adaptor::new("bench", Arc::new(board)), port)
    }

    #[test]
    fn parse_pin_accepts_numbers_only() {
        assert_eq!(parse_pin("13").unwrap(), 13);
        assert_eq!(parse_pin(" 7 ").unwrap(), 7);
        assert!(matches!(parse_pin("D13"), Err(BoardError::InvalidPin(p)) if p == "D13"));
        assert!(parse_pin("-1").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_can_change() {
        let (adaptor, _) = adaptor();
        assert_eq!(adaptor.name(), "bench");
        adaptor.set_name("lab");
        assert_eq!(adaptor.name(), "lab");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn digital_write_configures_unknown_pin() {
        let (adaptor, port) = adaptor();
        let ctx = Context::background();
        adaptor.connect(&ctx).await.unwrap();
        port.clear_written();

        adaptor.digital_write(&ctx, "13", 1).await.unwrap();
        adaptor.digital_write(&ctx, "13", 0).await.unwrap();

        assert_eq!(port.written(), vec!["/mode/13/o", "/digital/13/1", "/digital/13/0"]);
        assert_eq!(
            adaptor.board().pins()[&13],
            Pin::new(PinMode::Output, Level::Low)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn digital_read_configures_unknown_pin() {
        let (adaptor, port) = adaptor();
        let ctx = Context::background();
        adaptor.connect(&ctx).await.unwrap();
        port.firmware(|fw| fw.set_level(4, 1));
        port.clear_written();

        assert_eq!(adaptor.digital_read(&ctx, "4").await.unwrap(), 1);
        assert_eq!(port.written(), vec!["/mode/4/i", "/digital/4"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn digital_write_respects_existing_input_mode() {
        let (adaptor, port) = adaptor();
        let ctx = Context::background();
        adaptor.connect(&ctx).await.unwrap();
        adaptor
            .board()
            .add_pin(5, Pin::new(PinMode::Input, Level::Low));
        port.clear_written();

        assert!(matches!(
            adaptor.digital_write(&ctx, "5", 1).await,
            Err(BoardError::WrongPinMode { pin: 5, .. })
        ));
        assert!(port.written().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn value_read_and_finalize() {
        let (adaptor, port) = adaptor();
        let ctx = Context::background();
        port.firmware(|fw| fw.set_variable("humidity", 40));
        adaptor.connect(&ctx).await.unwrap();

        assert_eq!(adaptor.value_read(&ctx, "humidity").await.unwrap(), 40);
        adaptor.finalize(&ctx).await.unwrap();
        assert!(matches!(
            adaptor.value_read(&ctx, "humidity").await,
            Err(BoardError::NotConnected)
        ));
    }
}
