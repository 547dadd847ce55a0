//! The board contract shared by every transport.
//!
//! A [`Board`] is a remote microcontroller running aREST firmware. Both the
//! HTTP and serial transports implement it, so drivers and adaptors can hold
//! an `Arc<dyn Board>` without caring how bytes reach the board.
//!
//! # Operations
//!
//! | Operation | Wire command | Result |
//! |-----------|--------------|--------|
//! | [`connect`](Board::connect) | `/digital/0` probe | `()` |
//! | [`set_pin_mode`](Board::set_pin_mode) | `/mode/{pin}/{i\|I\|o}` | `()` |
//! | [`digital_write`](Board::digital_write) | `/digital/{pin}/{0\|1}` | `()` |
//! | [`digital_read`](Board::digital_read) | `/digital/{pin}` | level |
//! | [`read_value`](Board::read_value) | `/{name}` | JSON value |
//! | [`read_values`](Board::read_values) | `/` | JSON map |
//! | [`call_function`](Board::call_function) | `/{name}?params=..` | return code |
//!
//! Pin operations check the local [`PinRegistry`](crate::pin::PinRegistry)
//! first; a pin that was never configured, or is in the wrong mode, fails
//! without any wire traffic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::context::Context;
use crate::error::Result;
use crate::events::BoardEvent;
use crate::pin::{Pin, PinMode, PinNumber};

/// Remote aREST board.
///
/// Every operation takes a [`Context`]. A context that is already cancelled
/// or past its deadline makes the operation fail before touching the wire.
#[async_trait]
pub trait Board: Send + Sync {
    /// Open the link and run the liveness probe.
    async fn connect(&self, ctx: &Context) -> Result<()>;

    /// Close the link. Closing an already closed link is a no-op.
    async fn disconnect(&self, ctx: &Context) -> Result<()>;

    /// Disconnect, connect, then replay the pin registry onto the board.
    async fn reconnect(&self, ctx: &Context) -> Result<()>;

    /// Configure a pin and register it locally.
    ///
    /// [`PinMode::Unset`] is rejected with an invalid-mode error.
    async fn set_pin_mode(&self, ctx: &Context, pin: PinNumber, mode: PinMode) -> Result<()>;

    /// Drive an output pin. `level` must be `0` or `1`.
    async fn digital_write(&self, ctx: &Context, pin: PinNumber, level: u8) -> Result<()>;

    /// Read an input pin.
    async fn digital_read(&self, ctx: &Context, pin: PinNumber) -> Result<i64>;

    /// Read one named variable.
    async fn read_value(&self, ctx: &Context, name: &str) -> Result<Value>;

    /// Read every exposed variable.
    async fn read_values(&self, ctx: &Context) -> Result<Map<String, Value>>;

    /// Call a named function and return its integer result.
    async fn call_function(&self, ctx: &Context, name: &str, param: &str) -> Result<i64>;

    /// Snapshot of the local pin registry.
    fn pins(&self) -> BTreeMap<PinNumber, Pin>;

    /// Seed the registry with known pin state. Nothing is sent to the board.
    fn add_pin(&self, number: PinNumber, pin: Pin);

    /// Subscribe to connection lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<BoardEvent>;
}

/// Push the local pin registry back onto a (freshly reset) board.
///
/// Pins are replayed in ascending order. Each pin gets its mode first; output
/// pins then get their last written level. Pins still in
/// [`PinMode::Unset`] have nothing to replay and are skipped.
pub async fn replay_pins<B: Board + ?Sized>(board: &B, ctx: &Context) -> Result<()> {
    for (number, pin) in board.pins() {
        if pin.mode == PinMode::Unset {
            continue;
        }
        log::debug!("replaying pin {} as {}", number, pin.mode);
        board.set_pin_mode(ctx, number, pin.mode).await?;
        if pin.mode == PinMode::Output {
            board.digital_write(ctx, number, pin.value.as_u8()).await?;
        }
    }
    Ok(())
}
