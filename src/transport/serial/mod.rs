//! Serial transport: aREST over a raw byte stream.
//!
//! The link is an unframed stream with no request IDs, so correctness rests
//! on three rules:
//!
//! 1. **Single flight.** One async mutex guards the open [`Link`]; every
//!    command holds it from write until its response (or failure).
//! 2. **Silence detection.** A watchdog starts timing when a command is
//!    written and is fed by every byte the read loop sees. If the board stays
//!    silent for the response timeout, the link is declared dead and the
//!    in-flight command fails with [`BoardError::Timeout`].
//! 3. **Recovery.** A supervisor task listens for [`BoardEvent::Timeout`] and
//!    calls [`Board::reconnect`] until it succeeds, replaying the pin
//!    registry onto the (probably reset) board.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──probe ok──► Connected
//!       ▲                        │                      │
//!       └────── probe failed ────┘          timeout ────┤
//!       ▲                                               ▼
//!       └──────────── disconnect ──────────── reconnect loop
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use rs_arest::{Board, Context, PinMode, SerialConfig, SerialTransport};
//! use rs_arest::hal::SystemPortOpener;
//!
//! # async fn run() -> rs_arest::Result<()> {
//! let board = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0"), SystemPortOpener);
//! let ctx = Context::background();
//!
//! board.connect(&ctx).await?;
//! board.set_pin_mode(&ctx, 13, PinMode::Output).await?;
//! board.digital_write(&ctx, 13, 1).await?;
//! # Ok(())
//! # }
//! ```

mod worker;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, MutexGuard};

use crate::codec::{self, Command, PROBE_PIN};
use crate::config::SerialConfig;
use crate::context::Context;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventBus};
use crate::pin::{Level, Pin, PinMode, PinNumber, PinRegistry};
use crate::traits::{replay_pins, Board, PortOpener};

use worker::Link;

/// Connection state of a [`SerialTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No port open.
    #[default]
    Disconnected,
    /// Port open, liveness probe pending.
    Connecting,
    /// Probe answered.
    Connected,
}

impl ConnectionState {
    /// Returns the state as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

struct Shared {
    config: SerialConfig,
    opener: Box<dyn PortOpener>,
    pins: PinRegistry,
    events: EventBus,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
    supervised: AtomicBool,
}

/// aREST board reached over a serial port.
///
/// Cheap to clone; clones share the port, registry, and event bus. Background
/// tasks only hold weak references, so dropping the last clone closes the
/// port.
#[derive(Clone)]
pub struct SerialTransport {
    shared: Arc<Shared>,
}

impl core::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.shared.config.path)
            .field("state", &self.state())
            .finish()
    }
}

impl SerialTransport {
    /// Create a transport. Nothing is opened until [`Board::connect`].
    pub fn new(config: SerialConfig, opener: impl PortOpener + 'static) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                opener: Box::new(opener),
                pins: PinRegistry::new(),
                events: EventBus::new(),
                state,
                link: Mutex::new(None),
                supervised: AtomicBool::new(false),
            }),
        }
    }

    /// Transport configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.shared.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The transport's event bus.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            log::debug!(
                "{}: {} -> {}",
                self.shared.config.path,
                previous.as_str(),
                state.as_str()
            );
        }
    }

    async fn lock_link(&self, ctx: &Context) -> Result<MutexGuard<'_, Option<Link>>> {
        tokio::select! {
            guard = self.shared.link.lock() => Ok(guard),
            err = ctx.done() => Err(err),
        }
    }

    /// Run one exchange under the single-flight lock.
    async fn send(&self, ctx: &Context, command: &Command) -> Result<String> {
        ctx.check()?;
        let frame = command.serial_frame()?;

        let mut guard = self.lock_link(ctx).await?;
        let link = guard.as_mut().ok_or(BoardError::NotConnected)?;

        if self.shared.config.debug {
            log::debug!("serial -> {}", frame.trim_end());
        }
        let response = link.exchange(&frame, ctx).await?;
        if self.shared.config.debug {
            log::debug!("serial <- {}", response);
        }
        Ok(response)
    }

    fn open_link(&self) -> Result<Link> {
        let config = &self.shared.config;
        let mut port = self.shared.opener.open(config)?;
        port.clear_buffers()?;
        Link::start(port, config, self.shared.events.clone())
    }

    /// Close the current link, if any. Returns whether one was open.
    async fn teardown(&self) -> bool {
        let link = self.shared.link.lock().await.take();
        self.set_state(ConnectionState::Disconnected);
        match link {
            Some(link) => {
                link.close().await;
                true
            }
            None => false,
        }
    }

    async fn probe(&self, ctx: &Context) -> Result<()> {
        let body = self.send(ctx, &Command::DigitalRead { pin: PROBE_PIN }).await?;
        codec::decode_digital_read(&body).map(|_| ())
    }

    /// Start the recovery supervisor once, on the first connect.
    fn ensure_supervised(&self) {
        if self.shared.supervised.swap(true, Ordering::SeqCst) {
            return;
        }
        let events = self.shared.events.subscribe();
        tokio::spawn(supervise(Arc::downgrade(&self.shared), events));
    }
}

/// Reconnect after every watchdog timeout, retrying until it works.
///
/// Holds only a weak reference between attempts so the transport can be
/// dropped; exits once it is.
async fn supervise(shared: Weak<Shared>, mut events: broadcast::Receiver<BoardEvent>) {
    loop {
        match events.recv().await {
            Ok(BoardEvent::Timeout) => {}
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }

        let mut attempt: u32 = 0;
        loop {
            let pause = match shared.upgrade() {
                Some(shared) => shared.config.retry_pause(),
                None => return,
            };
            tokio::time::sleep(pause).await;

            let Some(shared) = shared.upgrade() else {
                return;
            };
            let transport = SerialTransport { shared };
            attempt += 1;
            log::info!(
                "{}: reconnecting after timeout (attempt {})",
                transport.shared.config.path,
                attempt
            );
            match transport.reconnect(&Context::background()).await {
                Ok(()) => break,
                Err(e) => log::error!(
                    "{}: reconnect failed: {}",
                    transport.shared.config.path,
                    e
                ),
            }
        }

        // Timeouts raised by failed attempts are already handled.
        events = events.resubscribe();
    }
}

#[async_trait]
impl Board for SerialTransport {
    async fn connect(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        self.ensure_supervised();

        {
            let mut guard = self.lock_link(ctx).await?;
            if guard.is_some() {
                return Ok(());
            }
            self.set_state(ConnectionState::Connecting);
            match self.open_link() {
                Ok(link) => *guard = Some(link),
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            }
        }

        let settle = self.shared.config.settle_delay();
        let result = async {
            if !settle.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(settle) => {}
                    err = ctx.done() => return Err(err),
                }
            }
            self.probe(ctx).await
        }
        .await;

        match result {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                log::info!("{}: connected", self.shared.config.path);
                self.shared.events.publish(BoardEvent::Connected);
                Ok(())
            }
            Err(e) => {
                log::warn!("{}: connect failed: {}", self.shared.config.path, e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<()> {
        if self.teardown().await {
            log::info!("{}: disconnected", self.shared.config.path);
            self.shared.events.publish(BoardEvent::Disconnected);
        }
        Ok(())
    }

    async fn reconnect(&self, ctx: &Context) -> Result<()> {
        self.disconnect(ctx).await?;

        let delay = self.shared.config.reconnect_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            err = ctx.done() => return Err(err),
        }

        self.connect(ctx).await?;
        replay_pins(self, ctx).await?;
        log::info!("{}: reconnected", self.shared.config.path);
        self.shared.events.publish(BoardEvent::Reconnected);
        Ok(())
    }

    async fn set_pin_mode(&self, ctx: &Context, pin: PinNumber, mode: PinMode) -> Result<()> {
        ctx.check()?;
        mode.wire_char()?;
        if self.state() == ConnectionState::Disconnected {
            return Err(BoardError::NotConnected);
        }
        self.shared.pins.ensure(pin);
        self.send(ctx, &Command::SetPinMode { pin, mode }).await?;
        self.shared.pins.set_mode(pin, mode);
        Ok(())
    }

    async fn digital_write(&self, ctx: &Context, pin: PinNumber, level: u8) -> Result<()> {
        ctx.check()?;
        let level = Level::from_value(level.into())?;
        self.shared.pins.require_output(pin)?;
        self.send(ctx, &Command::DigitalWrite { pin, level }).await?;
        self.shared.pins.set_value(pin, level);
        Ok(())
    }

    async fn digital_read(&self, ctx: &Context, pin: PinNumber) -> Result<i64> {
        ctx.check()?;
        self.shared.pins.require_input(pin)?;
        let body = self.send(ctx, &Command::DigitalRead { pin }).await?;
        codec::decode_digital_read(&body)
    }

    async fn read_value(&self, ctx: &Context, name: &str) -> Result<Value> {
        let command = Command::ReadValue {
            name: name.to_string(),
        };
        let body = self.send(ctx, &command).await?;
        codec::decode_value(&body, name)
    }

    async fn read_values(&self, ctx: &Context) -> Result<Map<String, Value>> {
        let body = self.send(ctx, &Command::ReadValues).await?;
        codec::decode_values(&body)
    }

    async fn call_function(&self, ctx: &Context, name: &str, param: &str) -> Result<i64> {
        let command = Command::CallFunction {
            name: name.to_string(),
            param: param.to_string(),
        };
        let body = self.send(ctx, &command).await?;
        codec::decode_function(&body, name)
    }

    fn pins(&self) -> BTreeMap<PinNumber, Pin> {
        self.shared.pins.snapshot()
    }

    fn add_pin(&self, number: PinNumber, pin: Pin) {
        self.shared.pins.insert(number, pin);
    }

    fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.shared.events.subscribe()
    }
}
