//! Byte-stream link traits used by the serial transport.
//!
//! The transport never touches a concrete port type. It opens links through a
//! [`PortOpener`] and drives them through [`SerialLink`], which lets the same
//! state machine run against a real port ([`crate::hal::SystemPortOpener`],
//! `serial` feature) or the in-memory board in [`crate::hal::mock`].

use std::io;

use crate::config::SerialConfig;
use crate::error::Result;

/// An open, bidirectional serial link.
///
/// Reads should honour a short timeout and report it as
/// [`io::ErrorKind::TimedOut`] (or return `Ok(0)`), so the read loop can
/// notice shutdown between reads.
pub trait SerialLink: io::Read + io::Write + Send {
    /// Second handle onto the same link. The transport reads from the clone
    /// on a blocking thread and writes through the original.
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;

    /// Discard anything pending in the input and output buffers.
    fn clear_buffers(&mut self) -> io::Result<()>;
}

/// Factory for [`SerialLink`]s. Called on every connect.
pub trait PortOpener: Send + Sync {
    /// Open the port described by `config`.
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>>;
}
