//! HTTP transport: aREST over plain HTTP requests.
//!
//! Each operation is one independent request against the configured base
//! URL: `GET` for reads, `POST` for mode changes, writes and function calls.
//! There are no background tasks; the client's own timeout bounds each call.
//!
//! # Example
//!
//! ```rust,no_run
//! use rs_arest::{Board, Context, HttpConfig, HttpTransport};
//!
//! # async fn run() -> rs_arest::Result<()> {
//! let board = HttpTransport::new(HttpConfig::new("http://192.168.1.50").with_timeout_ms(2_000))?;
//! let ctx = Context::background();
//!
//! board.connect(&ctx).await?;
//! let vars = board.read_values(&ctx).await?;
//! println!("{:?}", vars);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::codec::{self, Command, HttpMethod, PROBE_PIN};
use crate::config::HttpConfig;
use crate::context::Context;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventBus};
use crate::pin::{Level, Pin, PinMode, PinNumber, PinRegistry};
use crate::traits::{replay_pins, Board};

const JSON: &str = "application/json";

/// aREST board reached over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    config: HttpConfig,
    client: RwLock<Option<reqwest::Client>>,
    pins: PinRegistry,
    events: EventBus,
    connected: AtomicBool,
}

impl HttpTransport {
    /// Create a transport with a ready HTTP client.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client: RwLock::new(Some(client)),
            pins: PinRegistry::new(),
            events: EventBus::new(),
            connected: AtomicBool::new(false),
        })
    }

    /// Transport configuration.
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// True between a successful connect and the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The transport's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn client(&self) -> Option<reqwest::Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_client(&self, client: Option<reqwest::Client>) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = client;
    }

    async fn send(&self, ctx: &Context, command: &Command) -> Result<String> {
        ctx.check()?;
        let client = self.client().ok_or(BoardError::NotConnected)?;
        let url = format!("{}{}", self.config.base(), command.path()?);

        let request = match command.method() {
            HttpMethod::Get => client.get(&url),
            HttpMethod::Post => client.post(&url),
        };

        if self.config.debug {
            log::debug!("{:?} {}", command.method(), url);
        }

        let call = async {
            let response = request.send().await?.error_for_status()?;
            Ok::<_, BoardError>(response.text().await?)
        };
        let body = tokio::select! {
            body = call => body?,
            err = ctx.done() => return Err(err),
        };

        if self.config.debug {
            log::debug!("response: {}", body.trim_end());
        }
        Ok(body)
    }

    async fn probe(&self, ctx: &Context) -> Result<()> {
        let body = self.send(ctx, &Command::DigitalRead { pin: PROBE_PIN }).await?;
        codec::decode_digital_read(&body).map(|_| ())
    }
}

fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

#[async_trait]
impl Board for HttpTransport {
    async fn connect(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.client().is_none() {
            self.set_client(Some(build_client(&self.config)?));
        }
        self.probe(ctx).await?;

        self.connected.store(true, Ordering::SeqCst);
        log::info!("{}: connected", self.config.base());
        self.events.publish(BoardEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<()> {
        self.set_client(None);
        self.connected.store(false, Ordering::SeqCst);
        log::info!("{}: disconnected", self.config.base());
        self.events.publish(BoardEvent::Disconnected);
        Ok(())
    }

    async fn reconnect(&self, ctx: &Context) -> Result<()> {
        self.disconnect(ctx).await?;
        self.connect(ctx).await?;
        replay_pins(self, ctx).await?;
        log::info!("{}: reconnected", self.config.base());
        self.events.publish(BoardEvent::Reconnected);
        Ok(())
    }

    async fn set_pin_mode(&self, ctx: &Context, pin: PinNumber, mode: PinMode) -> Result<()> {
        ctx.check()?;
        mode.wire_char()?;
        self.pins.ensure(pin);
        self.send(ctx, &Command::SetPinMode { pin, mode }).await?;
        self.pins.set_mode(pin, mode);
        Ok(())
    }

    async fn digital_write(&self, ctx: &Context, pin: PinNumber, level: u8) -> Result<()> {
        ctx.check()?;
        let level = Level::from_value(level.into())?;
        self.pins.require_output(pin)?;
        self.send(ctx, &Command::DigitalWrite { pin, level }).await?;
        self.pins.set_value(pin, level);
        Ok(())
    }

    async fn digital_read(&self, ctx: &Context, pin: PinNumber) -> Result<i64> {
        ctx.check()?;
        self.pins.require_input(pin)?;
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
        self.pins.snapshot()
    }

    fn add_pin(&self, number: PinNumber, pin: Pin) {
        self.pins.insert(number, pin);
    }

    fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transport_has_client_but_is_not_connected() {
        let board = HttpTransport::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(board.client().is_some());
        assert!(!board.is_connected());
    }

    #[tokio::test]
    async fn disconnect_drops_client() {
        let board = HttpTransport::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();
        let ctx = Context::background();

        board.disconnect(&ctx).await.unwrap();
        assert!(board.client().is_none());
        assert!(matches!(
            board.read_values(&ctx).await,
            Err(BoardError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn precondition_errors_do_not_need_a_server() {
        let board = HttpTransport::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();
        let ctx = Context::background();

        assert!(matches!(
            board.digital_write(&ctx, 4, 1).await,
            Err(BoardError::PinNotConfigured { pin: 4 })
        ));
        assert!(matches!(
            board.digital_read(&ctx, 4).await,
            Err(BoardError::PinNotConfigured { pin: 4 })
        ));
    }

    #[tokio::test]
    async fn cancelled_context_fails_first() {
        let board = HttpTransport::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();
        let ctx = Context::background();
        ctx.cancel();

        assert!(matches!(
            board.read_value(&ctx, "temp").await,
            Err(BoardError::Cancelled)
        ));
        assert!(matches!(
            board.connect(&ctx).await,
            Err(BoardError::Cancelled)
        ));
    }
}
