//! Pin modes, levels, and the local pin registry.
//!
//! The registry mirrors what the board has been told: every pin configured
//! through `set_pin_mode` (or seeded with `add_pin`) keeps its mode and the
//! last level written to it. Transports consult it before every pin operation
//! and replay it after a reconnect.
//!
//! # Example
//!
//! ```rust
//! use rs_arest::pin::{Level, Pin, PinMode, PinRegistry};
//!
//! let registry = PinRegistry::new();
//! registry.insert(13, Pin::new(PinMode::Output, Level::High));
//!
//! assert!(registry.require_output(13).is_ok());
//! assert!(registry.require_input(13).is_err());
//! assert_eq!(registry.get(13).unwrap().value, Level::High);
//! ```

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{BoardError, Result};

/// Pin number on the board.
pub type PinNumber = u16;

/// Configured mode of a pin.
///
/// The wire letters are `i` (input), `I` (input with pull-up) and `o`
/// (output). [`Unset`](Self::Unset) marks a pin that is known locally but
/// was never configured; it has no wire letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinMode {
    /// Digital input.
    Input,
    /// Digital input with the internal pull-up enabled.
    InputPullup,
    /// Digital output.
    Output,
    /// Not configured yet.
    #[default]
    Unset,
}

impl PinMode {
    /// Returns the aREST mode letter, or `None` for [`Unset`](Self::Unset).
    ///
    /// ```
    /// use rs_arest::pin::PinMode;
    ///
    /// assert_eq!(PinMode::Input.as_char(), Some('i'));
    /// assert_eq!(PinMode::InputPullup.as_char(), Some('I'));
    /// assert_eq!(PinMode::Output.as_char(), Some('o'));
    /// assert_eq!(PinMode::Unset.as_char(), None);
    /// ```
    pub const fn as_char(&self) -> Option<char> {
        match self {
            PinMode::Input => Some('i'),
            PinMode::InputPullup => Some('I'),
            PinMode::Output => Some('o'),
            PinMode::Unset => None,
        }
    }

    /// Parse an aREST mode letter.
    ///
    /// Fails with [`BoardError::InvalidMode`] for anything other than
    /// `i`, `I` or `o`. Matching is case-sensitive.
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'i' => Ok(PinMode::Input),
            'I' => Ok(PinMode::InputPullup),
            'o' => Ok(PinMode::Output),
            other => Err(BoardError::InvalidMode(other.to_string())),
        }
    }

    /// Returns the mode as a lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PinMode::Input => "input",
            PinMode::InputPullup => "input-pullup",
            PinMode::Output => "output",
            PinMode::Unset => "unset",
        }
    }

    /// True for [`Input`](Self::Input) and [`InputPullup`](Self::InputPullup).
    #[inline]
    pub const fn is_input(&self) -> bool {
        matches!(self, PinMode::Input | PinMode::InputPullup)
    }

    /// Returns the wire letter, failing for [`Unset`](Self::Unset).
    pub(crate) fn wire_char(&self) -> Result<char> {
        self.as_char()
            .ok_or_else(|| BoardError::InvalidMode(self.as_str().to_string()))
    }
}

impl core::fmt::Display for PinMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digital level of a pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum Level {
    /// Logic 0.
    #[default]
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// Numeric wire value (`0` or `1`).
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// Validate a raw level. Only `0` and `1` are accepted.
    ///
    /// ```
    /// use rs_arest::pin::Level;
    ///
    /// assert_eq!(Level::from_value(1).unwrap(), Level::High);
    /// assert!(Level::from_value(2).is_err());
    /// ```
    pub fn from_value(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            other => Err(BoardError::InvalidLevel(other)),
        }
    }
}

/// Locally known state of one pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Pin {
    /// Configured mode.
    pub mode: PinMode,
    /// Last level written (meaningful for output pins).
    pub value: Level,
}

impl Pin {
    /// Create a pin record.
    pub const fn new(mode: PinMode, value: Level) -> Self {
        Self { mode, value }
    }
}

/// Thread-safe map of pin number to [`Pin`].
///
/// Iteration order is ascending pin number, which is also the replay order
/// after a reconnect.
#[derive(Debug, Default)]
pub struct PinRegistry {
    pins: RwLock<BTreeMap<PinNumber, Pin>>,
}

impl PinRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current pin table.
    pub fn snapshot(&self) -> BTreeMap<PinNumber, Pin> {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up one pin.
    pub fn get(&self, pin: PinNumber) -> Option<Pin> {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pin)
            .copied()
    }

    /// Returns true if the pin is registered.
    pub fn contains(&self, pin: PinNumber) -> bool {
        self.get(pin).is_some()
    }

    /// Number of registered pins.
    pub fn len(&self) -> usize {
        self.pins.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no pin is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a pin record.
    pub fn insert(&self, number: PinNumber, pin: Pin) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(number, pin);
    }

    /// Register the pin with default state if it is unknown.
    pub fn ensure(&self, number: PinNumber) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(number)
            .or_default();
    }

    /// Record a successful mode change.
    pub fn set_mode(&self, number: PinNumber, mode: PinMode) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(number)
            .or_default()
            .mode = mode;
    }

    /// Record a successful write.
    pub fn set_value(&self, number: PinNumber, value: Level) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(number)
            .or_default()
            .value = value;
    }

    /// Check that the pin may be written.
    pub fn require_output(&self, pin: PinNumber) -> Result<()> {
        match self.get(pin) {
            None => Err(BoardError::PinNotConfigured { pin }),
            Some(p) if p.mode == PinMode::Output => Ok(()),
            Some(p) => Err(BoardError::WrongPinMode {
                pin,
                actual: p.mode,
                required: "output",
            }),
        }
    }

    /// Check that the pin may be read.
    pub fn require_input(&self, pin: PinNumber) -> Result<()> {
        match self.get(pin) {
            None => Err(BoardError::PinNotConfigured { pin }),
            Some(p) if p.mode.is_input() => Ok(()),
            Some(p) => Err(BoardError::WrongPinMode {
                pin,
                actual: p.mode,
                required: "input or input-pullup",
            }),
        }
    }
}
