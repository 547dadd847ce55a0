//! Link implementations.
//!
//! - `mock`: in-memory board and serial port for tests
//! - `system`: operating-system serial ports (requires `serial` feature)

pub mod mock;

#[cfg(feature = "serial")]
pub mod system;

pub use mock::*;

#[cfg(feature = "serial")]
pub use system::*;
