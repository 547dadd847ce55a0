//! Board transports.
//!
//! | Transport | Link | Background work |
//! |-----------|------|-----------------|
//! | [`HttpTransport`] | one HTTP request per operation | none |
//! | [`SerialTransport`] | long-lived byte stream | read loop, watchdog, recovery |
//!
//! Both implement [`Board`](crate::traits::Board) and keep their own
//! [`PinRegistry`](crate::pin::PinRegistry).

#[cfg(feature = "http")]
pub mod http;
pub mod serial;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use serial::{ConnectionState, SerialTransport};
