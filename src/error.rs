//! Error types shared by both transports.
//!
//! Every board operation returns [`Result`]. Errors fall into five broad
//! categories, exposed through [`BoardError::kind`]:
//!
//! | Kind | Examples |
//! |------|----------|
//! | [`ErrorKind::Precondition`] | pin not configured, wrong pin mode |
//! | [`ErrorKind::Validation`] | unknown mode letter, unknown level value |
//! | [`ErrorKind::Protocol`] | expected response key absent, malformed JSON |
//! | [`ErrorKind::Transport`] | no open link, serial read/write failure, HTTP failure |
//! | [`ErrorKind::Timeout`] | watchdog-declared silence, deadline, cancellation |

use std::sync::Arc;
use std::time::Duration;

use crate::pin::PinMode;

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, BoardError>;

/// Broad classification of a [`BoardError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation was issued in a state that does not allow it.
    Precondition,
    /// An argument was outside the accepted set.
    Validation,
    /// The board answered, but not with what was expected.
    Protocol,
    /// The underlying link failed.
    Transport,
    /// The board went silent, or the caller gave up waiting.
    Timeout,
}

/// Errors returned by board operations.
///
/// Cheap to clone, so drivers can both publish and return the same error.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BoardError {
    /// The pin was never passed to `set_pin_mode` or `add_pin`.
    #[error("you need to set pin mode on pin {pin} before using it")]
    PinNotConfigured {
        /// Pin number.
        pin: u16,
    },

    /// The pin is registered, but in a mode that forbids the operation.
    #[error("pin {pin} is in {actual} mode, {required} mode is required")]
    WrongPinMode {
        /// Pin number.
        pin: u16,
        /// Mode the pin is currently in.
        actual: PinMode,
        /// Human-readable description of the accepted modes.
        required: &'static str,
    },

    /// The transport has no open link to the board.
    #[error("not connected")]
    NotConnected,

    /// Pin mode outside `{input, input-pullup, output}`.
    #[error("can't find mode {0}")]
    InvalidMode(String),

    /// Level outside `{0, 1}`.
    #[error("can't find level {0}")]
    InvalidLevel(i64),

    /// Pin identifier that is not a number.
    #[error("invalid pin {0:?}")]
    InvalidPin(String),

    /// Digital read response without `return_value`.
    #[error("response has no return_value")]
    ReturnValueNotFound,

    /// Variable read response without the variable key.
    #[error("variable {0} not found")]
    VariableNotFound(String),

    /// Bulk variable response without the `variables` key.
    #[error("no variable found")]
    VariablesNotFound,

    /// Function call response without `return_value`.
    #[error("function {0} not found")]
    FunctionNotFound(String),

    /// Function answered with a return code other than the expected one.
    #[error("function {function} returned {actual}, expected {expected}")]
    ReturnCodeMismatch {
        /// Function name.
        function: String,
        /// Expected return code.
        expected: i64,
        /// Return code received.
        actual: i64,
    },

    /// Response was not valid JSON, or a key had the wrong shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Serial link I/O failure.
    #[error("serial I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Port(String),

    /// HTTP request failure (connection, status, body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The watchdog saw no data from the board within the response timeout.
    #[error("board did not answer within {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl BoardError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PinNotConfigured { .. } | Self::WrongPinMode { .. } => ErrorKind::Precondition,
            Self::InvalidMode(_) | Self::InvalidLevel(_) | Self::InvalidPin(_) => {
                ErrorKind::Validation
            }
            Self::ReturnValueNotFound
            | Self::VariableNotFound(_)
            | Self::VariablesNotFound
            | Self::FunctionNotFound(_)
            | Self::ReturnCodeMismatch { .. }
            | Self::Decode(_) => ErrorKind::Protocol,
            Self::NotConnected | Self::Io(_) | Self::Port(_) | Self::Http(_) => {
                ErrorKind::Transport
            }
            Self::Timeout(_) | Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Timeout,
        }
    }

    /// Returns true for the "expected key absent" protocol errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReturnValueNotFound
                | Self::VariableNotFound(_)
                | Self::VariablesNotFound
                | Self::FunctionNotFound(_)
        )
    }
}

impl From<std::io::Error> for BoardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for BoardError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for BoardError {
    fn from(e: serialport::Error) -> Self {
        Self::Port(e.to_string())
    }
}
