//! Trait definitions for boards and serial links.
//!
//! # Submodules
//!
//! - `board`: the [`Board`] contract both transports implement
//! - `serial`: the [`SerialLink`] and [`PortOpener`] seams under the serial
//!   transport
//!
//! Mock implementations of the link traits live in [`crate::hal::mock`].

pub mod board;
pub mod serial;

pub use board::*;
pub use serial::*;
