//! # rs-arest
//!
//! Client for microcontrollers running aREST firmware, over HTTP or a serial
//! port, behind one async [`Board`] contract.
//!
//! ## Features
//!
//! - **Two transports**: stateless [`HttpTransport`] and stateful [`SerialTransport`]
//! - **Pin registry**: mode preconditions checked locally, before any wire traffic
//! - **Watchdog**: a silent serial board fails the in-flight call with a timeout
//! - **Self-healing**: serial links reconnect on timeout and replay pin state
//! - **Cancellation**: every operation takes a [`Context`] with cancel and deadline
//! - **Drivers**: poll variables or functions and publish changes
//!
//! ## Architecture
//!
//! - `traits` - [`Board`] contract and serial link seams
//! - `transport` - HTTP and serial implementations of [`Board`]
//! - `codec` - aREST paths and response decoding
//! - `pin` - pin modes, levels, and the registry
//! - `hal` - mock board/port for tests, system serial ports
//! - `adaptor`, `drivers` - conveniences on top of [`Board`]
//!
//! ## Example
//!
//! ```rust
//! use rs_arest::{Board, Context, PinMode, SerialConfig, SerialTransport};
//! use rs_arest::hal::{MockPortOpener, MockSerialPort};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! // An in-memory board; swap in `hal::SystemPortOpener` for real hardware.
//! let port = MockSerialPort::new();
//! let config = SerialConfig::new("/dev/ttyUSB0").with_settle_delay_ms(0);
//! let board = SerialTransport::new(config, MockPortOpener::new(port));
//! let ctx = Context::background();
//!
//! board.connect(&ctx).await.unwrap();
//! board.set_pin_mode(&ctx, 13, PinMode::Output).await.unwrap();
//! board.digital_write(&ctx, 13, 1).await.unwrap();
//!
//! assert_eq!(board.pins()[&13].mode, PinMode::Output);
//! # });
//! ```

#![warn(missing_docs)]

/// Named board handle with pin-string shortcuts.
pub mod adaptor;
/// aREST request paths and response decoding.
pub mod codec;
/// Transport configuration.
pub mod config;
/// Cancellation and deadlines.
pub mod context;
/// Polling drivers that publish value changes.
pub mod drivers;
/// Error type and classification.
pub mod error;
/// Connection lifecycle events.
pub mod events;
/// Mock and system link implementations.
pub mod hal;
/// Pin modes, levels, and the pin registry.
pub mod pin;
/// Board and serial link traits.
pub mod traits;
/// HTTP and serial board transports.
pub mod transport;

// Re-exports for convenience
pub use adaptor::Adaptor;
pub use config::{DataBits, HttpConfig, Parity, SerialConfig, StopBits};
pub use context::Context;
pub use drivers::{Driver, DriverEvent, FunctionDriver, ValueDriver, ValuesDriver};
pub use error::{BoardError, ErrorKind, Result};
pub use events::{BoardEvent, EventBus};
pub use pin::{Level, Pin, PinMode, PinNumber, PinRegistry};
pub use traits::{replay_pins, Board, PortOpener, SerialLink};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{ConnectionState, SerialTransport};
